//! Local geolocation capability.

use super::Fix;

/// Something that can report where this host is.
#[async_trait::async_trait]
pub trait GeolocationProvider: Send + Sync + std::fmt::Debug {
    /// The current fix, if the capability has one.
    async fn current_fix(&self) -> Option<Fix>;
}

/// A fixed, configured position.
#[derive(Debug, Clone, Copy)]
pub struct StaticGeolocation {
    fix: Fix,
}

impl StaticGeolocation {
    /// Always report `fix`.
    #[must_use]
    pub fn new(fix: Fix) -> Self {
        Self { fix }
    }
}

#[async_trait::async_trait]
impl GeolocationProvider for StaticGeolocation {
    async fn current_fix(&self) -> Option<Fix> {
        Some(self.fix)
    }
}

/// No geolocation available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait::async_trait]
impl GeolocationProvider for NoGeolocation {
    async fn current_fix(&self) -> Option<Fix> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_providers() {
        let fixed = StaticGeolocation::new(Fix::at(12.97, 77.59));
        assert_eq!(fixed.current_fix().await, Some(Fix::at(12.97, 77.59)));
        assert_eq!(NoGeolocation.current_fix().await, None);
    }
}
