//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - upgrade completed
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Declined - the operator did not confirm the upgrade
pub const DECLINED: i32 = 2;

/// Version error - target unparsable or source version not upgradable
pub const VERSION_ERROR: i32 = 3;

/// State error - nothing installed, or the installation state is unreadable
pub const STATE_ERROR: i32 = 4;

/// Partial upgrade - failed after the cluster was modified
pub const PARTIAL_UPGRADE: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted - cancelled with Ctrl-C (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
