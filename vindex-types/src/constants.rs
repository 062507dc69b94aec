use crate::primitives::{Amount, Timestamp};

// ─── Chain Identity ──────────────────────────────────────────────────────────

/// Default chain identifier.
pub const CHAIN_ID: &str = "vindexchain-1";

/// Symbol of the native staking and fee denom.
pub const NATIVE_DENOM: &str = "oc";

/// Number of decimal places for the native denom.
pub const NATIVE_DECIMALS: u32 = 9;

/// One full native token in base units (10^9).
pub const ONE_OC: Amount = 1_000_000_000;

/// Initial supply of the native denom in base units.
pub const INITIAL_SUPPLY: Amount = 1_000_000_000 * ONE_OC;

// ─── Consensus Parameters ────────────────────────────────────────────────────

/// Minimum size of the active validator set.
pub const MIN_VALIDATORS: u32 = 4;

/// Maximum size of the active validator set.
pub const MAX_VALIDATORS: u32 = 100;

/// Target time between blocks, in seconds.
pub const BLOCK_TIME_SECS: u64 = 3;

/// How far a proposed block's timestamp may run ahead of local time (5 minutes).
pub const MAX_TIMESTAMP_DRIFT: Timestamp = 300;

/// Number of blocks per epoch. Validator-set changes apply at epoch boundaries.
pub const EPOCH_LENGTH: u64 = 100;

/// Resolution of the proposer schedule: the heaviest validator gets this many
/// slots per cycle.
pub const PROPOSER_SCHEDULE_RESOLUTION: u64 = 1_000;

// ─── Staking Parameters ──────────────────────────────────────────────────────

/// Time an undelegation stays escrowed before it is credited back (21 days).
pub const UNBONDING_PERIOD_SECS: Timestamp = 21 * 24 * 60 * 60;

/// Native units minted per block and distributed to bonded validators.
pub const DEFAULT_BLOCK_REWARD: Amount = 0;

// ─── Token Factory Parameters ────────────────────────────────────────────────

/// Fee charged for creating a new denom (100 native tokens).
pub const TOKEN_CREATION_FEE: Amount = 100 * ONE_OC;

/// Default split of the token creation fee, in percent.
pub const FEE_SPLIT_LIQUIDITY: u64 = 50;
pub const FEE_SPLIT_VALIDATOR: u64 = 20;
pub const FEE_SPLIT_DEV_TEAM: u64 = 20;
pub const FEE_SPLIT_LP: u64 = 10;

/// Maximum length of a token symbol.
pub const MAX_SYMBOL_LEN: usize = 12;

// ─── Domain Parameters ───────────────────────────────────────────────────────

/// Fee per year of domain registration (1 native token).
pub const DOMAIN_REGISTRATION_FEE: Amount = ONE_OC;

/// Fee per year of domain renewal (1 native token).
pub const DOMAIN_RENEWAL_FEE: Amount = ONE_OC;

/// A domain year, without leap-year adjustment.
pub const SECONDS_PER_YEAR: Timestamp = 365 * 24 * 60 * 60;

/// Maximum number of years per registration or renewal.
pub const MAX_DOMAIN_YEARS: u32 = 10;

/// Minimum domain name length.
pub const MIN_DOMAIN_NAME_LEN: usize = 3;

/// Maximum domain name length.
pub const MAX_DOMAIN_NAME_LEN: usize = 32;

/// Maximum size of a domain record payload in bytes.
pub const MAX_DOMAIN_RECORD_LEN: usize = 1_024;

// ─── AutoBurn Parameters ─────────────────────────────────────────────────────

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Share of the native supply burned per AutoBurn (1%).
pub const AUTO_BURN_RATE_BPS: u64 = 100;

/// Minimum time between two burns (6 months of 30 days).
pub const AUTO_BURN_THRESHOLD_SECS: Timestamp = 6 * 30 * 24 * 60 * 60;

// ─── Module Account Labels ───────────────────────────────────────────────────

pub const BONDED_POOL_LABEL: &str = "bonded_pool";
pub const TREASURY_LABEL: &str = "treasury";
pub const LIQUIDITY_POOL_LABEL: &str = "liquidity_pool";
pub const VALIDATOR_POOL_LABEL: &str = "validator_pool";
pub const DEV_TEAM_POOL_LABEL: &str = "dev_team_pool";
pub const LP_POOL_LABEL: &str = "lp_pool";

// ─── Node Parameters ─────────────────────────────────────────────────────────

/// Default mempool capacity.
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 5_000;

/// Default maximum number of transactions per block.
pub const MAX_TXS_PER_BLOCK: usize = 1_000;
