// panel.rs

use crate::error::{AncestryError, Result};
use crate::labels::LabelMapper;
use crate::table::SampleId;
use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One labeled member of a (possibly extended) reference panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelEntry {
    pub id: SampleId,
    pub label: String,
    pub group: String,
}

/// Describes how an extra sample list joins the panel and which group is kept.
#[derive(Debug, Clone)]
pub struct PanelExtension {
    pub extra_label: String,
    pub extra_group: String,
    pub keep_group: String,
}

/// Reads a headerless `FID IID` list, whitespace separated.
pub fn read_id_list(path: &Path) -> Result<Vec<SampleId>> {
    let file = File::open(path)?;
    let mut ids = Vec::new();
    for (line_idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [fid, iid, ..] => ids.push(SampleId::new(*fid, *iid)),
            [_] => {
                return Err(AncestryError::parse(
                    path,
                    line_idx + 1,
                    "expected FID and IID columns",
                ))
            }
        }
    }
    info!("Read {} sample IDs from {}", ids.len(), path.display());
    Ok(ids)
}

/// Reference labels as panel entries. The label file carries no family IDs, so FID is `0`.
pub fn reference_entries(labels: &[(String, String)], mapper: &LabelMapper) -> Vec<PanelEntry> {
    labels
        .iter()
        .map(|(iid, label)| PanelEntry {
            id: SampleId::new("0", iid.clone()),
            label: label.clone(),
            group: mapper.group_for(label).to_string(),
        })
        .collect()
}

/// Appends `extra_ids` under the extension's label and group, then keeps one group.
pub fn extend_panel(
    reference: Vec<PanelEntry>,
    extra_ids: Vec<SampleId>,
    extension: &PanelExtension,
) -> Vec<PanelEntry> {
    let extra = extra_ids.into_iter().map(|id| PanelEntry {
        id,
        label: extension.extra_label.clone(),
        group: extension.extra_group.clone(),
    });
    reference
        .into_iter()
        .chain(extra)
        .filter(|entry| entry.group == extension.keep_group)
        .collect()
}

pub fn label_counts(entries: &[PanelEntry]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.label.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extend_eur_panel_with_aj_list() {
        let labels = vec![
            ("HG1".to_string(), "GBR".to_string()),
            ("HG2".to_string(), "YRI".to_string()),
            ("HG3".to_string(), "FIN".to_string()),
            ("HG4".to_string(), "UNKNOWN".to_string()),
        ];
        let mapper = LabelMapper::continental(false);
        let reference = reference_entries(&labels, &mapper);
        let extension = PanelExtension {
            extra_label: "AJ".into(),
            extra_group: "EUR".into(),
            keep_group: "EUR".into(),
        };
        let extra = vec![SampleId::new("f9", "aj1"), SampleId::new("f9", "aj2")];
        let merged = extend_panel(reference, extra, &extension);

        let iids: Vec<&str> = merged.iter().map(|e| e.id.iid.as_str()).collect();
        assert_eq!(iids, vec!["HG1", "HG3", "aj1", "aj2"]);
        assert_eq!(merged[0].id.fid, "0");
        assert_eq!(merged[2].id.fid, "f9");
        let counts = label_counts(&merged);
        assert_eq!(counts["AJ"], 2);
        assert_eq!(counts["GBR"], 1);
        assert!(!counts.contains_key("YRI"));
    }

    #[test]
    fn test_read_id_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.list");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "f1\ts1\n\nf2 s2 extra").unwrap();
        let ids = read_id_list(&path).unwrap();
        assert_eq!(ids, vec![SampleId::new("f1", "s1"), SampleId::new("f2", "s2")]);

        let bad = dir.path().join("bad.list");
        std::fs::write(&bad, "onlyone\n").unwrap();
        assert!(matches!(
            read_id_list(&bad),
            Err(AncestryError::Parse { line: 1, .. })
        ));
    }
}
