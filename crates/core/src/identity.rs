//! Identity token generation

use crate::error::{IdentityError, Result};
use crate::store::TaskStore;
use crate::types::IdentityToken;

use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, warn};

/// Produces identity tokens from the operating system's CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGenerator;

impl IdentityGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self
    }

    /// A fresh random token over the full `i32` range
    pub fn generate(&self) -> IdentityToken {
        OsRng.gen::<IdentityToken>()
    }

    /// Generate a token that `in_use` reports as free.
    ///
    /// Every collision consumes one unit of `retry_budget`; once the budget is
    /// spent the call fails with [`IdentityError::Exhausted`]. Lookup errors
    /// from `in_use` are returned as-is. The caller owns the surrounding
    /// transaction, this routine only reads.
    pub fn generate_unique<F>(&self, mut in_use: F, retry_budget: u32) -> Result<IdentityToken>
    where
        F: FnMut(IdentityToken) -> Result<bool>,
    {
        let mut remaining = retry_budget;
        while remaining > 0 {
            let token = self.generate();
            if !in_use(token)? {
                return Ok(token);
            }
            remaining -= 1;
            debug!("Identity token {} already in use, {} retries left", token, remaining);
        }

        warn!("Identity retry budget of {} exhausted", retry_budget);
        Err(IdentityError::Exhausted {
            budget: retry_budget,
        }
        .into())
    }

    /// Generate a token unused by any task in `store`
    pub fn generate_unique_in(
        &self,
        store: &dyn TaskStore,
        retry_budget: u32,
    ) -> Result<IdentityToken> {
        self.generate_unique(|token| store.exists_identity(token), retry_budget)
    }
}
