use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of one running scan: the scan id together with the user who owns it.
///
/// Both trackers are keyed by this pair, so it must hash and compare by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanIdentity {
    pub scan_id: Uuid,
    pub user_id: Uuid,
}

impl ScanIdentity {
    pub fn new(scan_id: Uuid, user_id: Uuid) -> Self {
        Self { scan_id, user_id }
    }
}

impl fmt::Display for ScanIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scan_id, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_value_equality() {
        let scan_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut set = HashSet::new();
        set.insert(ScanIdentity::new(scan_id, user_id));

        assert!(set.contains(&ScanIdentity::new(scan_id, user_id)));
        assert!(!set.contains(&ScanIdentity::new(scan_id, Uuid::new_v4())));
    }
}
