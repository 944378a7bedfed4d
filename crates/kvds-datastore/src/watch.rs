use kvds_store::WatchStream;
use kvds_types::KvObject;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of a typed watch stream.
pub const WATCH_BUFFER: usize = 16;

/// Typed change notifications for one watched object.
pub type ObjectStream = mpsc::Receiver<Box<dyn KvObject>>;

/// Spawn the activity turning raw notifications on `key` into typed objects.
///
/// `template` is a fresh instance of the watched type; each notification is
/// decoded into a new object built from it. A template without the
/// constructor capability closes the stream at once. Undecodable payloads are logged
/// and dropped. The activity exits when `cancel` fires, the caller drops the
/// returned stream, or the backend stream ends; on exit it cancels
/// `backend_stop`, releasing the backend subscription, and the returned
/// stream closes.
pub(crate) fn spawn_forwarder(
    key: String,
    template: Box<dyn KvObject>,
    mut raw: WatchStream,
    cancel: CancellationToken,
    backend_stop: CancellationToken,
) -> ObjectStream {
    let (tx, rx) = mpsc::channel(WATCH_BUFFER);

    tokio::spawn(async move {
        let _release = backend_stop.drop_guard();
        let Some(ctor) = template.as_constructor() else {
            warn!(key = %key, "watched type cannot build new objects; watch not started");
            return;
        };
        debug!(key = %key, "watch started");

        loop {
            let pair = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                pair = raw.recv() => match pair {
                    Some(pair) => pair,
                    None => break,
                },
            };

            let mut object = ctor.new_object();
            if let Err(e) = object.set_value(&pair.value) {
                warn!(key = %key, index = pair.last_index, error = %e, "could not decode watch notification; dropped");
                continue;
            }
            object.set_index(pair.last_index);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(object) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(key = %key, "watch stopped");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvds_store::KvPair;
    use kvds_types::{DataScope, Record, TypeError};
    use serde_json::json;
    use std::time::Duration;

    struct Opaque;

    impl KvObject for Opaque {
        fn key(&self) -> Vec<String> {
            vec!["opaque".into()]
        }
        fn key_prefix(&self) -> Vec<String> {
            vec!["opaque".into()]
        }
        fn value(&self) -> Option<Vec<u8>> {
            None
        }
        fn set_value(&mut self, _value: &[u8]) -> Result<(), TypeError> {
            Ok(())
        }
        fn index(&self) -> u64 {
            0
        }
        fn set_index(&mut self, _index: u64) {}
        fn data_scope(&self) -> DataScope {
            DataScope::Global
        }
    }

    #[tokio::test]
    async fn template_without_constructor_closes_at_once() {
        let (raw_tx, raw) = mpsc::unbounded_channel();
        let backend_stop = CancellationToken::new();
        let mut stream = spawn_forwarder(
            "opaque/".into(),
            Box::new(Opaque),
            raw,
            CancellationToken::new(),
            backend_stop.clone(),
        );

        let _ = raw_tx.send(KvPair::new("opaque/", b"x".to_vec(), 1));
        let ended = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .unwrap();
        assert!(ended.is_none());
        assert!(backend_stop.is_cancelled());
    }

    #[tokio::test]
    async fn notifications_are_decoded_into_new_objects() {
        let (raw_tx, raw) = mpsc::unbounded_channel();
        let template = Record::new(DataScope::Global, ["network"], "n1", json!(null));
        let cancel = CancellationToken::new();
        let backend_stop = CancellationToken::new();
        let mut stream = spawn_forwarder(
            "network/n1/".into(),
            Box::new(template),
            raw,
            cancel.clone(),
            backend_stop.clone(),
        );

        raw_tx.send(KvPair::new("network/n1/", b"{oops".to_vec(), 1)).unwrap();
        let payload = Record::new(DataScope::Global, ["network"], "n1", json!(7))
            .value()
            .unwrap();
        raw_tx.send(KvPair::new("network/n1/", payload, 2)).unwrap();
        let got = stream.recv().await.unwrap();
        assert_eq!(got.index(), 2);
        assert_eq!(got.downcast::<Record>().unwrap().data(), &json!(7));

        cancel.cancel();
        assert!(stream.recv().await.is_none());
        assert!(backend_stop.is_cancelled());
    }
}
