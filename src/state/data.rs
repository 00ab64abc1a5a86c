/// Shared data structures for the snip library
///
/// These structs represent the data model that flows between
/// the master index, the artifact store and the preview layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Token standing in for the 4-digit frame number in flipbook references
pub const FRAME_TOKEN: &str = "$F4";

/// The four places a snip lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    /// The saved graph fragment itself (mandatory)
    Snip,
    /// Numbered image sequence under `preview/flipbook/<identifier>/`
    Flipbook,
    /// Single still under `preview/snapshot/`
    Snapshot,
    /// The record inside `descriptions/master.json`
    Index,
}

impl ArtifactKind {
    /// The three kinds backed by files, in the order they are moved
    pub const FILESYSTEM: [ArtifactKind; 3] =
        [ArtifactKind::Snip, ArtifactKind::Flipbook, ArtifactKind::Snapshot];

    pub fn is_optional(self) -> bool {
        matches!(self, ArtifactKind::Flipbook | ArtifactKind::Snapshot)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Snip => "snip file",
            ArtifactKind::Flipbook => "flipbook",
            ArtifactKind::Snapshot => "snapshot",
            ArtifactKind::Index => "index record",
        };
        f.write_str(name)
    }
}

/// Physical locations derived from one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub snip: PathBuf,
    pub flipbook_dir: PathBuf,
    /// Frame pattern containing [`FRAME_TOKEN`]
    pub flipbook_pattern: PathBuf,
    pub snapshot: PathBuf,
    pub index: PathBuf,
}

/// One entry of the master index
///
/// Field names on disk follow the established `master.json` layout,
/// so existing libraries keep loading.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnipRecord {
    /// Library directory of the owning user
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "User")]
    pub user: String,
    /// Canonical identifier without extension (primary key)
    #[serde(rename = "File Name")]
    pub identifier: String,
    #[serde(rename = "Ext")]
    pub ext: String,
    /// Relative frame pattern, e.g. `/preview/flipbook/<id>/<id>.$F4.png`
    #[serde(rename = "Flipbook", default, with = "optional_reference")]
    pub flipbook: Option<String>,
    /// Relative snapshot path, e.g. `/preview/snapshot/<id>.png`
    #[serde(rename = "Snap", default, with = "optional_reference")]
    pub snapshot: Option<String>,
    #[serde(rename = "Summary", default)]
    pub summary: String,
    #[serde(rename = "Keywords", default)]
    pub keywords: Vec<String>,
    /// `%Y-%m-%d`
    #[serde(rename = "Date", default)]
    pub date: String,
    /// `%H:%M:%S`
    #[serde(rename = "Time", default)]
    pub time: String,
    /// Snip file size in bytes
    #[serde(rename = "Size", default)]
    pub size: u64,
}

impl SnipRecord {
    /// Relative flipbook reference for an identifier
    pub fn flipbook_reference(identifier: &str) -> String {
        format!("/preview/flipbook/{identifier}/{identifier}.{FRAME_TOKEN}.png")
    }

    /// Relative snapshot reference for an identifier
    pub fn snapshot_reference(identifier: &str) -> String {
        format!("/preview/snapshot/{identifier}.png")
    }
}

/// Empty strings on disk mean "no preview"
mod optional_reference {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value.filter(|reference| !reference.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_references_read_as_absent() {
        let json = r#"{
            "Path": "/lib/alice", "User": "alice",
            "File Name": "SOP_flip_basicSetup_alice_v01", "Ext": "uti",
            "Flipbook": "", "Snap": "/preview/snapshot/SOP_flip_basicSetup_alice_v01.png",
            "Summary": "splash", "Keywords": ["sop"],
            "Date": "2024-05-01", "Time": "10:00:00", "Size": 12
        }"#;

        let record: SnipRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.flipbook, None);
        assert_eq!(
            record.snapshot.as_deref(),
            Some("/preview/snapshot/SOP_flip_basicSetup_alice_v01.png")
        );
    }

    #[test]
    fn test_absent_references_are_written_as_empty_strings() {
        let record = SnipRecord {
            path: "/lib/bob".into(),
            user: "bob".into(),
            identifier: "OBJ_rig_arm_bob_v02".into(),
            ext: "uti".into(),
            flipbook: None,
            snapshot: None,
            summary: String::new(),
            keywords: vec![],
            date: "2024-05-01".into(),
            time: "10:00:00".into(),
            size: 0,
        };

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["Flipbook"], "");
        assert_eq!(value["Snap"], "");
        assert_eq!(value["File Name"], "OBJ_rig_arm_bob_v02");
    }

    #[test]
    fn test_reference_templates() {
        assert_eq!(
            SnipRecord::flipbook_reference("SOP_a_b_c_v01"),
            "/preview/flipbook/SOP_a_b_c_v01/SOP_a_b_c_v01.$F4.png"
        );
        assert_eq!(
            SnipRecord::snapshot_reference("SOP_a_b_c_v01"),
            "/preview/snapshot/SOP_a_b_c_v01.png"
        );
    }
}
