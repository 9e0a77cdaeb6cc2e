//! Feature dump — serialize a node map's client-visible surface as JSON.
//!
//! Presentation clients (terminal browsers, config editors) and golden
//! tests consume this instead of walking the typed accessors themselves.

use std::io::Write;

use serde::Serialize;

use crate::map::NodeMap;
use crate::model::{AccessMode, Visibility};
use crate::node::InterfaceType;
use crate::{Error, Result};

/// One feature as a presentation client sees it.
#[derive(Debug, Serialize)]
pub struct FeatureRecord {
    pub name: String,
    pub interface: InterfaceType,
    pub access: AccessMode,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Snapshot every node: name, type, access, visibility, and — for
/// readable value-bearing nodes — the display string.
pub fn dump_features(map: &NodeMap) -> Result<Vec<FeatureRecord>> {
    let mut records = Vec::with_capacity(map.node_count());
    for id in map.nodes() {
        let access = map.access_mode(id)?;
        let value = if access.is_readable() {
            // Categories and transient read failures dump without a value.
            map.to_text(id).ok()
        } else {
            None
        };
        records.push(FeatureRecord {
            name: map.node_name(id)?,
            interface: map.interface_type(id)?,
            access,
            visibility: map.visibility(id)?,
            value,
            description: map.description(id)?,
        });
    }
    Ok(records)
}

/// Write the feature dump as pretty-printed JSON.
pub fn export_json(map: &NodeMap, writer: &mut dyn Write) -> Result<()> {
    let records = dump_features(map)?;
    serde_json::to_writer_pretty(&mut *writer, &records)
        .map_err(|e| Error::Runtime(format!("feature dump serialization failed: {e}")))?;
    writeln!(writer)?;
    Ok(())
}
