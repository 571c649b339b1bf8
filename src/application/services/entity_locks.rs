use crate::domain::value_objects::EntityType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// エンティティ種別ごとの排他ロック。
///
/// ローカル変更・送信キューの再送・リモートからの取り込みは同じロックの下で直列化する。
#[derive(Default)]
pub struct EntityLocks {
    locks: StdMutex<HashMap<EntityType, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, entity: &EntityType) -> OwnedMutexGuard<()> {
        self.lock_for(entity).lock_owned().await
    }

    fn lock_for(&self, entity: &EntityType) -> Arc<Mutex<()>> {
        let mut guard = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            guard
                .entry(entity.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entity(name: &str) -> EntityType {
        EntityType::new(name.into()).unwrap()
    }

    #[tokio::test]
    async fn same_entity_is_exclusive_other_entities_are_not() {
        let locks = Arc::new(EntityLocks::new());
        let guard = locks.acquire(&entity("produtos")).await;

        let blocked = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire(&entity("produtos")).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        tokio::time::timeout(Duration::from_secs(1), locks.acquire(&entity("clientes")))
            .await
            .expect("other entity must not wait");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("waiter should proceed once released")
            .unwrap();
    }
}
