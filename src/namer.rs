use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, SnapshotError};

/// Time source for asset names and snapshot timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock frozen at one instant, for reproducible names.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Produces collision-resistant local file names.
///
/// The name is `md5(reference + nanoseconds since epoch)` in hex plus the
/// extension. It does not depend on content, so two calls for the same
/// reference at different instants give different names; callers dedupe
/// references before naming.
#[derive(Debug, Clone)]
pub struct AssetNamer<C> {
    clock: C,
}

impl<C: Clock> AssetNamer<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn name_for(&self, reference: &str, extension: &str) -> Result<String> {
        let nanos = self
            .clock
            .now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SnapshotError::Naming {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?
            .as_nanos();

        let digest = md5::compute(format!("{}{}", reference, nanos));
        Ok(format!("{:x}.{}", digest, extension))
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
