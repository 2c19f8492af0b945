//! Client for the disk/bag record service the batch strategy reports to.
//!
//! The service tracks a disk's upload lifecycle in a four-level
//! hierarchy: disk, vehicle group, clip (one ~50 GB batch with a
//! platform-assigned data id), and bag. Records travel as camelCase
//! JSON; the service assigns `id`/`state` fields, so those are
//! read-only on our side and never serialized back except for bag
//! state updates.

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TaskInfo;
use crate::platform::PlatformClient;

/// Upload lifecycle states the record service tracks.
pub mod upload_state {
    pub const INIT: i64 = 0;
    pub const SUCCESS: i64 = 2;
    pub const FAILED: i64 = 3;
    pub const DESENSITIZING: i64 = 4;
    pub const DESENSITIZATION_FAILED: i64 = 5;
    pub const DESENSITIZATION_COMPLETE: i64 = 6;

    /// States at or past a successful upload; re-uploading such a
    /// clip would race the downstream pipeline.
    pub fn is_settled(state: i64) -> bool {
        matches!(
            state,
            SUCCESS | DESENSITIZING | DESENSITIZATION_FAILED | DESENSITIZATION_COMPLETE
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BagRecord {
    pub id: Option<i64>,
    pub bag_id: String,
    pub red_oss_path: String,
    pub yellow_oss_path: String,
    pub state: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipRecord {
    pub data_id: String,
    #[serde(skip_serializing)]
    pub state: i64,
    pub bag_infos: Vec<BagRecord>,
}

impl ClipRecord {
    /// Stamp the platform-assigned data id into the clip and every
    /// bag path that still carries the placeholder.
    pub fn assign_data_id(&mut self, data_id: &str) {
        self.data_id = data_id.to_string();
        for bag in &mut self.bag_infos {
            bag.red_oss_path = bag.red_oss_path.replace("DATAID", data_id);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupRecord {
    pub group_id: String,
    pub car_id: String,
    pub source_disk_sn: String,
    pub vin: String,
    pub collect_date: String,
    pub yellow_oss_path: String,
    #[serde(skip_serializing)]
    pub state: i64,
    pub source_bag_count: u64,
    pub source_bag_size: u64,
    pub data_infos: Vec<ClipRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskRecord {
    #[serde(skip_serializing)]
    pub id: Option<i64>,
    pub sn_num: String,
    pub data_type: String,
    pub upload_date: String,
    #[serde(skip_serializing)]
    pub state: i64,
    pub group_infos: Vec<GroupRecord>,
}

impl DiskRecord {
    pub fn find_group(&self, vin: &str, collect_date: &str) -> Option<&GroupRecord> {
        self.group_infos
            .iter()
            .find(|g| g.vin == vin && g.collect_date == collect_date)
    }
}

pub struct RemoteLedgerClient {
    client: PlatformClient,
    base_url: String,
}

impl RemoteLedgerClient {
    pub fn new(client: PlatformClient, base_url: &str) -> Self {
        info!("Remote record service at {}", base_url);
        RemoteLedgerClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_tags(client: PlatformClient, info: &TaskInfo) -> Result<Self> {
        let base = info
            .tag("cs_gac_data_record_url")
            .ok_or_else(|| anyhow!("Missing cs_gac_data_record_url tag"))?;
        Ok(Self::new(client, base))
    }

    /// Fetch the disk record for a serial number and upload date, if
    /// the service knows it.
    pub async fn find_disk(&self, sn: &str, upload_date: &str) -> Option<DiskRecord> {
        let url = format!("{}/disk/findBySnNumAndUploadDate", self.base_url);
        let data = self
            .client
            .get_json(&url, &[("snNum", sn), ("uploadDate", upload_date)])
            .await?;

        match serde_json::from_value(data) {
            Ok(disk) => Some(disk),
            Err(e) => {
                warn!("Undecodable disk record for {}: {}", sn, e);
                None
            }
        }
    }

    /// Register a freshly-scanned disk. Returns the service's `data`
    /// payload on acceptance.
    pub async fn create_disk(&self, disk: &DiskRecord) -> Option<Value> {
        let url = format!("{}/disk/create", self.base_url);
        let payload = match serde_json::to_value(disk) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize disk record for {}: {}", disk.sn_num, e);
                return None;
            }
        };

        let body = self.client.post_json(&url, &payload).await?;
        body.get("data").cloned()
    }

    /// Report one bag's terminal upload state.
    pub async fn update_bag_state(&self, bag: &BagRecord) -> bool {
        let url = format!("{}/bag/updateState", self.base_url);
        let payload = match serde_json::to_value(bag) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize bag record {}: {}", bag.bag_id, e);
                return false;
            }
        };

        self.client.post_json(&url, &payload).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settled_states() {
        assert!(!upload_state::is_settled(upload_state::INIT));
        assert!(!upload_state::is_settled(upload_state::FAILED));
        assert!(upload_state::is_settled(upload_state::SUCCESS));
        assert!(upload_state::is_settled(upload_state::DESENSITIZING));
        assert!(upload_state::is_settled(upload_state::DESENSITIZATION_FAILED));
        assert!(upload_state::is_settled(upload_state::DESENSITIZATION_COMPLETE));
    }

    #[test]
    fn test_disk_record_wire_shape() {
        let disk = DiskRecord {
            id: Some(12),
            sn_num: "SN001".to_string(),
            data_type: "batch".to_string(),
            upload_date: "2025-03-01".to_string(),
            state: upload_state::SUCCESS,
            group_infos: vec![GroupRecord {
                group_id: "g1".to_string(),
                vin: "LMW01".to_string(),
                collect_date: "2025-02-27".to_string(),
                ..Default::default()
            }],
        };

        let wire = serde_json::to_value(&disk).unwrap();
        // Service-owned fields stay off the wire
        assert!(wire.get("id").is_none());
        assert!(wire.get("state").is_none());
        assert_eq!(wire["snNum"], "SN001");
        assert_eq!(wire["uploadDate"], "2025-03-01");
        assert_eq!(wire["groupInfos"][0]["vin"], "LMW01");
        assert!(wire["groupInfos"][0].get("state").is_none());
    }

    #[test]
    fn test_disk_record_parses_service_reply() {
        let disk: DiskRecord = serde_json::from_value(json!({
            "id": 7,
            "snNum": "SN7",
            "dataType": "batch",
            "uploadDate": "2025-03-02",
            "state": 2,
            "groupInfos": [{
                "groupId": "g7",
                "carId": "",
                "sourceDiskSn": "SN7",
                "vin": "LMW07",
                "collectDate": "2025-03-01",
                "yellowOssPath": "oss://b/ubm/source/",
                "state": 2,
                "sourceBagCount": 3,
                "sourceBagSize": 999,
                "dataInfos": [{
                    "dataId": "41",
                    "state": 2,
                    "bagInfos": [{
                        "id": 1,
                        "bagId": "bag_a",
                        "redOssPath": "batch/gpg/41/bag_a",
                        "yellowOssPath": "",
                        "state": 2
                    }]
                }]
            }]
        }))
        .unwrap();

        assert_eq!(disk.id, Some(7));
        assert_eq!(disk.state, 2);
        let group = disk.find_group("LMW07", "2025-03-01").unwrap();
        assert_eq!(group.data_infos[0].data_id, "41");
        assert_eq!(group.data_infos[0].bag_infos[0].bag_id, "bag_a");
        assert!(disk.find_group("LMW07", "2025-01-01").is_none());
    }

    #[test]
    fn test_assign_data_id_rewrites_placeholder() {
        let mut clip = ClipRecord {
            data_id: String::new(),
            state: 0,
            bag_infos: vec![BagRecord {
                bag_id: "bag_a".to_string(),
                red_oss_path: "batch/gpg/DATAID/bag_a".to_string(),
                ..Default::default()
            }],
        };

        clip.assign_data_id("1207");
        assert_eq!(clip.data_id, "1207");
        assert_eq!(clip.bag_infos[0].red_oss_path, "batch/gpg/1207/bag_a");
    }
}
