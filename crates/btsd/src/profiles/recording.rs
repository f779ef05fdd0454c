use std::sync::Mutex;

use bt_core::{BtError, BtResult};
use tracing::debug;

use crate::profile::lock;

/// Ordered record of stack calls, shared by the recording stacks.
///
/// Each entry is `"<op> <details>"`. Operations named with
/// [`CallLog::fail_on`] are still recorded but return `BtError::Fail`.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    failing: Mutex<Vec<&'static str>>,
}

impl CallLog {
    pub fn record(&self, op: &'static str, details: impl Into<String>) -> BtResult<()> {
        let details = details.into();
        let entry = if details.is_empty() {
            op.to_string()
        } else {
            format!("{op} {details}")
        };
        debug!(call = %entry, "Stack call");
        lock(&self.calls).push(entry);

        if lock(&self.failing).contains(&op) {
            Err(BtError::Fail)
        } else {
            Ok(())
        }
    }

    pub fn fail_on(&self, op: &'static str) {
        lock(&self.failing).push(op);
    }

    pub fn succeed_on(&self, op: &'static str) {
        lock(&self.failing).retain(|o| *o != op);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.calls))
    }

    /// Number of recorded calls whose op is `op`.
    pub fn count(&self, op: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_fails_on_demand() {
        let log = CallLog::default();
        assert_eq!(log.record("connect", "aa"), Ok(()));
        log.fail_on("connect");
        assert_eq!(log.record("connect", "bb"), Err(BtError::Fail));
        assert_eq!(log.record("cleanup", ""), Ok(()));

        assert_eq!(log.calls(), vec!["connect aa", "connect bb", "cleanup"]);
        assert_eq!(log.count("connect"), 2);
        assert_eq!(log.take().len(), 3);
        assert!(log.calls().is_empty());
    }
}
