use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

type SlotKey = (Uuid, NaiveDate, NaiveTime);

/// Process-wide mutual exclusion per (practice, date, time).
///
/// The availability check and the appointment insert must form one unit,
/// otherwise two concurrent bookings both observe a free slot and both
/// insert. Services are constructed per request, so the registry is a
/// process singleton.
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>,
}

impl SlotLockRegistry {
    fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    pub fn global() -> &'static SlotLockRegistry {
        static REGISTRY: OnceLock<SlotLockRegistry> = OnceLock::new();
        REGISTRY.get_or_init(SlotLockRegistry::new)
    }

    pub fn lock_for(&self, practice_id: Uuid, date: NaiveDate, time: NaiveTime) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("slot lock registry poisoned");
        Arc::clone(
            locks.entry((practice_id, date, time))
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_slot_shares_one_lock() {
        let registry = SlotLockRegistry::new();
        let practice = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();

        let a = registry.lock_for(practice, date, time);
        let b = registry.lock_for(practice, date, time);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_slots_do_not_contend() {
        let registry = SlotLockRegistry::new();
        let practice = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

        let a = registry.lock_for(practice, date, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let b = registry.lock_for(practice, date, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
