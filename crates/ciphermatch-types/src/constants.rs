//! System-wide constants for the CipherMatch engine.

/// Decimal places kept on settled output amounts (rounded toward zero).
pub const AMOUNT_PRECISION: u32 = 8;

/// Largest whole-unit amount accepted at intake, for the escrow as well as
/// the encrypted minimum output. Keeps every clearing sum far inside
/// `Decimal` range even for the largest allowed batch.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

/// Default batch window length in milliseconds.
pub const DEFAULT_BATCH_WINDOW_MS: u64 = 30_000;

/// Default member count at which a batch becomes closable early.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Hard upper bound on `max_batch_size` accepted by config validation.
pub const MAX_BATCH_SIZE_LIMIT: usize = 100_000;

/// Settlement idempotency cache size (number of batch ids to remember).
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 10_000;

/// Capacity of the engine service command channel.
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 1024;

/// Domain separator for batch membership roots.
pub const MEMBERSHIP_ROOT_DOMAIN: &[u8] = b"ciphermatch:membership:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "CipherMatch";
