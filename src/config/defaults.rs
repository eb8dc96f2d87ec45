//! Default constants for imgpipe configuration
//!
//! These constants define the default values used by the orchestrator when
//! no explicit override is provided via environment or CLI.

/// Default provider region
pub const DEFAULT_REGION: &str = "us-east-1";

/// The provider's "default" region: store creation in this region must be
/// issued without a location constraint.
pub const PROVIDER_DEFAULT_REGION: &str = "us-east-1";

/// Default resource-name prefix
pub const DEFAULT_NAME_PREFIX: &str = "imgpipe";

/// Default execution role name
pub const DEFAULT_ROLE_NAME: &str = "imgpipe-exec-role";

/// Default permission policy name
pub const DEFAULT_POLICY_NAME: &str = "imgpipe-store-access";

/// Default compute function name
pub const DEFAULT_FUNCTION_NAME: &str = "imgpipe-processor";

/// Default function handler identifier
pub const DEFAULT_HANDLER: &str = "handler.on_object_created";

/// Default function memory limit in MB
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// Default function timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// Default path to the deployable function artifact
pub const DEFAULT_ARTIFACT_PATH: &str = "./build/function.zip";

/// Fallback execution role names, probed in priority order when the desired
/// role neither exists nor can be created.
pub const FALLBACK_ROLE_NAMES: &[&str] = &[
    "lambda-execution-role",
    "service-default-role",
    "default-exec-role",
];

/// Settling delay after role/policy creation, tolerating the control
/// plane's eventual-consistency window before function creation.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 10_000;

/// Interval between function-state polls while waiting for Active.
pub const DEFAULT_WAIT_POLL_MS: u64 = 2_000;

/// Maximum number of function-state polls before the waiter gives up.
pub const DEFAULT_WAIT_MAX_POLLS: u32 = 30;

/// Hard provider quota on retained policy versions (1 default + 4 others).
pub const MAX_POLICY_VERSIONS: usize = 5;

/// Event types installed on the inbound store's notification binding.
pub const OBJECT_CREATED_EVENTS: &[&str] = &["object:created:*"];
