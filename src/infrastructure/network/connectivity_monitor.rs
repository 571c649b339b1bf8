use crate::application::ports::reachability_probe::ReachabilityProbe;
use crate::domain::value_objects::ConnectivityState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub type ConnectivityListener = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

type ListenerMap = Mutex<HashMap<u64, ConnectivityListener>>;

/// `subscribe` の戻り値。`unsubscribe` を呼ぶまで通知が続く。
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut guard) = listeners.lock() {
                guard.remove(&self.id);
            }
        }
    }
}

/// オンライン/オフライン状態を保持し、遷移を購読者に通知する。
///
/// プラットフォームからの受動的な「オンライン」通知はプローブで到達性を確認してから反映し、
/// 「オフライン」通知は即座に反映する。
pub struct ConnectivityMonitor {
    state_tx: watch::Sender<ConnectivityState>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState, probe: Option<Arc<dyn ReachabilityProbe>>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(initial);
        Arc::new(Self {
            state_tx,
            probe,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
            probe_task: Mutex::new(None),
        })
    }

    pub fn current(&self) -> bool {
        self.state().is_online()
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.listeners.lock() {
            guard.insert(id, Arc::new(listener));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// 受動的なネットワーク通知を受け取る
    pub async fn report_signal(&self, online_hint: bool) -> ConnectivityState {
        if !online_hint {
            self.set_state(ConnectivityState::Offline);
            return ConnectivityState::Offline;
        }

        match &self.probe {
            Some(_) => self.probe_now().await,
            None => {
                self.set_state(ConnectivityState::Online);
                ConnectivityState::Online
            }
        }
    }

    /// プローブを実行して結果を状態に反映する。プローブ未設定なら現状を返す。
    pub async fn probe_now(&self) -> ConnectivityState {
        let Some(probe) = &self.probe else {
            return self.state();
        };

        let reachable = probe.probe().await;
        let state = ConnectivityState::from(reachable);
        self.set_state(state);
        state
    }

    /// 状態を更新する。変化した場合のみ購読者へ通知し `true` を返す。
    pub fn set_state(&self, state: ConnectivityState) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            tracing::info!(
                target: "offline::connectivity",
                online = state.is_online(),
                "connectivity changed"
            );
            self.notify(state);
        }
        changed
    }

    /// オフラインの間、一定間隔で到達性を確認する
    pub fn spawn_probe_loop(self: &Arc<Self>, interval: Duration) {
        if self.probe.is_none() {
            tracing::debug!(
                target: "offline::connectivity",
                "no reachability probe configured; probe loop not started"
            );
            return;
        }

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                if !monitor.current() {
                    monitor.probe_now().await;
                }
            }
        });

        if let Ok(mut guard) = self.probe_task.lock() {
            if let Some(previous) = guard.replace(handle) {
                previous.abort();
            }
        }
    }

    pub fn stop_probe_loop(&self) {
        if let Ok(mut guard) = self.probe_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    fn notify(&self, state: ConnectivityState) {
        let listeners: Vec<ConnectivityListener> = match self.listeners.lock() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(state);
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop_probe_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct SwitchProbe {
        reachable: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwitchProbe {
        fn new(reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                reachable: AtomicBool::new(reachable),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ReachabilityProbe for SwitchProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reachable.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn listeners_fire_on_transitions_only_until_unsubscribed() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online, None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = monitor.subscribe(move |state| sink.lock().unwrap().push(state));

        assert!(!monitor.set_state(ConnectivityState::Online));
        assert!(monitor.set_state(ConnectivityState::Offline));
        monitor.report_signal(true).await;
        assert!(monitor.current());

        subscription.unsubscribe();
        monitor.set_state(ConnectivityState::Offline);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectivityState::Offline, ConnectivityState::Online]
        );
    }

    #[tokio::test]
    async fn online_hint_requires_successful_probe() {
        let probe = SwitchProbe::new(false);
        let monitor = ConnectivityMonitor::new(
            ConnectivityState::Offline,
            Some(Arc::clone(&probe) as Arc<dyn ReachabilityProbe>),
        );

        assert_eq!(monitor.report_signal(true).await, ConnectivityState::Offline);
        assert!(!monitor.current());

        probe.reachable.store(true, Ordering::SeqCst);
        assert_eq!(monitor.report_signal(true).await, ConnectivityState::Online);

        // オフライン通知はプローブなしで即反映
        assert_eq!(monitor.report_signal(false).await, ConnectivityState::Offline);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn probe_loop_brings_monitor_back_online() {
        let probe = SwitchProbe::new(false);
        let monitor = ConnectivityMonitor::new(
            ConnectivityState::Offline,
            Some(Arc::clone(&probe) as Arc<dyn ReachabilityProbe>),
        );
        let mut rx = monitor.watch();

        monitor.spawn_probe_loop(Duration::from_millis(10));
        probe.reachable.store(true, Ordering::SeqCst);

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_online()))
            .await
            .expect("monitor should come online")
            .unwrap();

        monitor.stop_probe_loop();
        assert!(monitor.current());
    }
}
