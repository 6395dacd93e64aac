//! History sync: pull every joined channel with its backlog and merge it
//! into the store.

use tracing::{debug, info, warn};

use cipherchat_core::{ChannelId, UserId};
use cipherchat_keys::{ChannelCipher, ChannelKey, CryptoError, KeyStore};
use cipherchat_store::{AppendOutcome, ChannelStore, NewMessage};

use crate::error::{Result, SyncError};
use crate::remote::{ChannelSnapshot, HistorySource};

/// Report of one history pass.
#[derive(Debug, Default)]
pub struct HistoryReport {
    /// Channels that were new to the store.
    pub channels_created: Vec<ChannelId>,
    /// Channels that were already known.
    pub channels_known: usize,
    /// `(channel, seq)` of each newly appended message.
    pub appended: Vec<(ChannelId, u64)>,
    /// `(channel, seq)` of each transient echo confirmed by the backlog.
    pub promoted: Vec<(ChannelId, u64)>,
    /// Messages already in the store.
    pub duplicates: usize,
    /// Messages that could not be decrypted, per channel.
    pub undecryptable: Vec<(ChannelId, CryptoError)>,
    /// Channels skipped entirely.
    pub failures: Vec<(ChannelId, SyncError)>,
}

impl HistoryReport {
    /// Messages that changed the store.
    pub fn messages_applied(&self) -> usize {
        self.appended.len() + self.promoted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.undecryptable.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: HistoryReport) {
        self.channels_created.extend(other.channels_created);
        self.channels_known += other.channels_known;
        self.appended.extend(other.appended);
        self.promoted.extend(other.promoted);
        self.duplicates += other.duplicates;
        self.undecryptable.extend(other.undecryptable);
        self.failures.extend(other.failures);
    }
}

/// Merges server-side channel state into a [`ChannelStore`].
pub struct HistorySync<'a> {
    keys: &'a KeyStore,
    store: &'a mut ChannelStore,
}

impl<'a> HistorySync<'a> {
    pub fn new(keys: &'a KeyStore, store: &'a mut ChannelStore) -> Self {
        Self { keys, store }
    }

    /// Fetch every channel of `user` and apply it.
    ///
    /// Only the fetch itself can fail; problems with individual channels or
    /// messages are recorded in the report.
    pub async fn fetch_channels_and_backlog<H>(
        &mut self,
        source: &H,
        user: UserId,
    ) -> Result<HistoryReport>
    where
        H: HistorySource + ?Sized,
    {
        let snapshots = source
            .fetch_channels_and_backlog(user, &self.keys.public_key_pem())
            .await?;

        let mut report = HistoryReport::default();
        for snapshot in &snapshots {
            self.apply_snapshot(snapshot, &mut report);
        }

        info!(
            channels = snapshots.len(),
            created = report.channels_created.len(),
            applied = report.messages_applied(),
            duplicates = report.duplicates,
            undecryptable = report.undecryptable.len(),
            failed = report.failures.len(),
            "history sync complete"
        );
        Ok(report)
    }

    /// Apply one channel snapshot.
    ///
    /// A known channel keeps its stored key; the wrapped key is only opened
    /// for channels the store has not seen.
    pub fn apply_snapshot(&mut self, snapshot: &ChannelSnapshot, report: &mut HistoryReport) {
        let id = snapshot.id;

        let known = self.store.channel_key(&id).cloned();
        let key = match known {
            Some(key) => {
                report.channels_known += 1;
                key
            }
            None => match self.keys.unwrap_channel_key(&snapshot.wrapped_key) {
                Ok(key) => {
                    self.store.upsert_channel(id, snapshot.name.clone(), key.clone());
                    report.channels_created.push(id);
                    key
                }
                Err(source) => {
                    warn!(channel = %id, error = %source, "skipping channel: key unwrap failed");
                    report
                        .failures
                        .push((id, SyncError::ChannelKey { channel: id, source }));
                    return;
                }
            },
        };

        self.apply_backlog(id, &key, snapshot, report);
    }

    fn apply_backlog(
        &mut self,
        id: ChannelId,
        key: &ChannelKey,
        snapshot: &ChannelSnapshot,
        report: &mut HistoryReport,
    ) {
        for entry in &snapshot.backlog {
            let text = match ChannelCipher::decrypt(&entry.ciphertext, key) {
                Ok(text) => text,
                Err(e) => {
                    debug!(channel = %id, sender = %entry.sender.id, error = %e, "undecryptable backlog message");
                    report.undecryptable.push((id, e));
                    continue;
                }
            };

            let message =
                NewMessage::from_delivery(&id, entry.sender.clone(), text, &entry.ciphertext);
            match self.store.append_message(&id, message, true) {
                Ok(AppendOutcome::Appended(seq)) => report.appended.push((id, seq)),
                Ok(AppendOutcome::Promoted(seq)) => report.promoted.push((id, seq)),
                Ok(AppendOutcome::Duplicate(_)) => report.duplicates += 1,
                Err(e) => {
                    // Channel was resolved above.
                    report.failures.push((id, e.into()));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cipherchat_core::Sender;
    use cipherchat_keys::seal_to_base64;

    use crate::remote::{BacklogMessage, RemoteError, RemoteResult};

    struct StaticHistory(Vec<ChannelSnapshot>);

    #[async_trait]
    impl HistorySource for StaticHistory {
        async fn fetch_channels_and_backlog(
            &self,
            _user: UserId,
            _client_key_pem: &str,
        ) -> RemoteResult<Vec<ChannelSnapshot>> {
            Ok(self.0.clone())
        }
    }

    struct Offline;

    #[async_trait]
    impl HistorySource for Offline {
        async fn fetch_channels_and_backlog(
            &self,
            _user: UserId,
            _client_key_pem: &str,
        ) -> RemoteResult<Vec<ChannelSnapshot>> {
            Err(RemoteError::Unavailable(anyhow::anyhow!("connection refused")))
        }
    }

    fn snapshot(
        keys: &KeyStore,
        id: ChannelId,
        key: &ChannelKey,
        texts: &[&str],
    ) -> ChannelSnapshot {
        ChannelSnapshot {
            id,
            name: id.to_string(),
            wrapped_key: seal_to_base64(key.as_bytes(), &keys.public_key()).unwrap(),
            backlog: texts
                .iter()
                .map(|t| BacklogMessage {
                    sender: Sender::new(2, "bob"),
                    ciphertext: ChannelCipher::encrypt(t, key).unwrap(),
                })
                .collect(),
        }
    }

    fn texts(store: &ChannelStore, id: &ChannelId) -> Vec<String> {
        store
            .messages(id)
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_history_populates_store_in_order() {
        let keys = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();
        let key = ChannelKey::generate();
        let lobby = ChannelId::group(1);
        let source = StaticHistory(vec![snapshot(&keys, lobby, &key, &["A", "B", "C"])]);

        let report = HistorySync::new(&keys, &mut store)
            .fetch_channels_and_backlog(&source, UserId(1))
            .await
            .unwrap();

        assert_eq!(report.channels_created, vec![lobby]);
        assert_eq!(report.messages_applied(), 3);
        assert_eq!(texts(&store, &lobby), vec!["A", "B", "C"]);
        assert_eq!(store.channel_key(&lobby), Some(&key));
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let keys = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();
        let key = ChannelKey::generate();
        let lobby = ChannelId::group(1);
        let source = StaticHistory(vec![snapshot(&keys, lobby, &key, &["A", "B"])]);

        let mut sync = HistorySync::new(&keys, &mut store);
        sync.fetch_channels_and_backlog(&source, UserId(1))
            .await
            .unwrap();
        let report = sync
            .fetch_channels_and_backlog(&source, UserId(1))
            .await
            .unwrap();

        assert_eq!(report.channels_known, 1);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.messages_applied(), 0);
        assert_eq!(texts(&store, &lobby), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_known_channel_keeps_stored_key() {
        let keys = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();
        let key = ChannelKey::generate();
        let lobby = ChannelId::group(1);
        store.upsert_channel(lobby, "lobby", key.clone());

        let mut snap = snapshot(&keys, lobby, &key, &["A"]);
        snap.wrapped_key = "garbage".into();

        let report = HistorySync::new(&keys, &mut store)
            .fetch_channels_and_backlog(&StaticHistory(vec![snap]), UserId(1))
            .await
            .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(texts(&store, &lobby), vec!["A"]);
    }

    #[tokio::test]
    async fn test_bad_channel_does_not_abort_others() {
        let keys = KeyStore::generate_identity().unwrap();
        let other = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();
        let key = ChannelKey::generate();

        let broken = snapshot(&other, ChannelId::group(1), &key, &["lost"]);
        let fine = snapshot(&keys, ChannelId::group(2), &key, &["kept"]);

        let report = HistorySync::new(&keys, &mut store)
            .fetch_channels_and_backlog(&StaticHistory(vec![broken, fine]), UserId(1))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            (id, SyncError::ChannelKey { .. }) if id == ChannelId::group(1)
        ));
        assert!(!store.contains(&ChannelId::group(1)));
        assert_eq!(texts(&store, &ChannelId::group(2)), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_undecryptable_message_omitted() {
        let keys = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();
        let key = ChannelKey::generate();
        let lobby = ChannelId::group(1);

        let mut snap = snapshot(&keys, lobby, &key, &["A", "C"]);
        snap.backlog.insert(
            1,
            BacklogMessage {
                sender: Sender::new(3, "mallory"),
                ciphertext: ChannelCipher::encrypt("B", &ChannelKey::generate()).unwrap(),
            },
        );

        let report = HistorySync::new(&keys, &mut store)
            .fetch_channels_and_backlog(&StaticHistory(vec![snap]), UserId(1))
            .await
            .unwrap();

        assert_eq!(report.undecryptable.len(), 1);
        assert!(!report.is_clean());
        assert_eq!(texts(&store, &lobby), vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let keys = KeyStore::generate_identity().unwrap();
        let mut store = ChannelStore::new();

        let result = HistorySync::new(&keys, &mut store)
            .fetch_channels_and_backlog(&Offline, UserId(1))
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Remote(RemoteError::Unavailable(_)))
        ));
        assert!(store.is_empty());
    }
}
