//! Per-package status notifications.
//!
//! Exactly one message goes out per package once it reaches a
//! terminal state, success or not. Delivery failures are logged and
//! absorbed; a run never fails because a notification did not land.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};

use anyhow::Result;

use crate::config::TaskInfo;
use crate::models::{Package, PackageStatus};
use crate::platform::remote_ledger::{upload_state, BagRecord, RemoteLedgerClient};
use crate::platform::PlatformClient;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn package_finished(&self, package: &Package);
}

/// Default notifier: one JSON message per package POSTed to the
/// configured log topic.
pub struct HttpNotifier {
    client: PlatformClient,
    topic_url: Option<String>,
    sn: String,
}

impl HttpNotifier {
    pub fn new(client: PlatformClient, info: &TaskInfo, sn: &str) -> Self {
        let topic_url = info.tag("upload_log_topic").map(str::to_string);
        if topic_url.is_none() {
            warn!("No upload_log_topic configured, package notifications disabled");
        }
        HttpNotifier {
            client,
            topic_url,
            sn: sn.to_string(),
        }
    }

    fn build_message(&self, package: &Package) -> Value {
        let mut message = json!({
            "package_name": package.key,
            "input_bucket_path": package.remote_prefix.clone().unwrap_or_default(),
            "upload_start_time": package.started_at.clone().unwrap_or_default(),
            "upload_end_time": package.finished_at.clone().unwrap_or_default(),
            "desc": package.status.as_str(),
            "local_path": package.local_root.to_string_lossy(),
            "sn": self.sn,
            "taskId": package.task_id.clone().unwrap_or_default(),
        });

        // Strategy-specific fields ride along in the package meta
        if let (Value::Object(base), Some(Value::Object(extra))) =
            (&mut message, &package.message_meta)
        {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }

        json!({ "log@customer": message })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn package_finished(&self, package: &Package) {
        let url = match &self.topic_url {
            Some(url) => url,
            None => {
                debug!("Skipping notification for {}", package.key);
                return;
            }
        };

        let payload = self.build_message(package);
        if self.client.post_json(url, &payload).await.is_none() {
            warn!("Notification for {} was not delivered", package.key);
        }
    }
}

/// Batch-flavor notifier: forwards the assembled bag message on
/// success, and reports the bag's terminal state to the record
/// service either way.
pub struct BagStateNotifier {
    client: PlatformClient,
    ledger: RemoteLedgerClient,
    message_url: Option<String>,
}

impl BagStateNotifier {
    pub fn new(client: PlatformClient, info: &TaskInfo) -> Result<Self> {
        let ledger = RemoteLedgerClient::from_tags(client.clone(), info)?;
        Ok(BagStateNotifier {
            client,
            ledger,
            message_url: info.tag("mq_url").map(str::to_string),
        })
    }

    // The record service matches bags by bagId, not row id
    fn bag_record(package: &Package) -> BagRecord {
        BagRecord {
            id: None,
            bag_id: package.key.clone(),
            red_oss_path: package.remote_prefix.clone().unwrap_or_default(),
            yellow_oss_path: package.remote_target.clone().unwrap_or_default(),
            state: if package.status == PackageStatus::Success {
                upload_state::SUCCESS
            } else {
                upload_state::FAILED
            },
        }
    }
}

#[async_trait]
impl Notifier for BagStateNotifier {
    async fn package_finished(&self, package: &Package) {
        if package.status == PackageStatus::Success {
            if let (Some(url), Some(meta)) = (&self.message_url, &package.message_meta) {
                // The rabbit relay expects the bare message; every
                // other topic gets the wrapped form
                let payload = if url.contains("rabbitLog") {
                    meta.clone()
                } else {
                    json!({ "log@customer": meta })
                };

                if self.client.post_json(url, &payload).await.is_none() {
                    warn!("Bag message for {} was not delivered", package.key);
                }
            }
        }

        let bag = Self::bag_record(package);
        if !self.ledger.update_bag_state(&bag).await {
            warn!("Bag state for {} was not recorded", package.key);
        }
    }
}
