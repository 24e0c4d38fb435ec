pub mod credential_prewarm;
pub mod pool_health;
