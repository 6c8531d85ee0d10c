//! Row and node types shared by the view layer
//!
//! Rows are read-only snapshots of what the case database returned; the view
//! layer orders and filters them but never writes them back.

use serde::{Deserialize, Serialize};

use super::tsk;

/// One item of the case database as the views see it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRow {
    /// Stable object id (`obj_id`)
    pub id: i64,
    pub name: String,
    pub size: i64,
    /// `tsk_files.type`
    pub file_type: i32,
    pub dir_type: i32,
    pub meta_type: i32,
    pub dir_flags: i32,
    pub meta_flags: i32,
    /// NULL in the database maps to None
    pub known: Option<i32>,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub data_source_id: i64,
}

impl ContentRow {
    pub fn is_known(&self) -> bool {
        self.known == Some(tsk::KNOWN_KNOWN)
    }

    pub fn is_slack(&self) -> bool {
        self.file_type == tsk::FILE_TYPE_SLACK
    }
}

/// Closed set of content variants a row materializes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    File,
    Directory,
    VirtualDirectory,
    LocalDirectory,
    LayoutFile,
    CarvedFile,
    DerivedFile,
    LocalFile,
    SlackFile,
}

impl ContentKind {
    /// Decide the variant for a row
    pub fn of(row: &ContentRow) -> Self {
        match row.file_type {
            tsk::FILE_TYPE_VIRTUAL_DIR => ContentKind::VirtualDirectory,
            tsk::FILE_TYPE_LOCAL_DIR => ContentKind::LocalDirectory,
            tsk::FILE_TYPE_UNALLOC_BLOCKS
            | tsk::FILE_TYPE_UNUSED_BLOCKS
            | tsk::FILE_TYPE_LAYOUT_FILE => ContentKind::LayoutFile,
            tsk::FILE_TYPE_CARVED => ContentKind::CarvedFile,
            tsk::FILE_TYPE_DERIVED => ContentKind::DerivedFile,
            tsk::FILE_TYPE_LOCAL => ContentKind::LocalFile,
            tsk::FILE_TYPE_SLACK => ContentKind::SlackFile,
            _ if row.meta_type == tsk::META_TYPE_DIR || row.dir_type == tsk::NAME_TYPE_DIR => {
                ContentKind::Directory
            }
            _ => ContentKind::File,
        }
    }

    /// Whether nodes of this kind can have children of their own
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ContentKind::Directory | ContentKind::VirtualDirectory | ContentKind::LocalDirectory
        )
    }
}

/// A row materialized for display; the kind is fixed at creation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentNode {
    pub kind: ContentKind,
    pub row: ContentRow,
}

impl ContentNode {
    pub fn from_row(row: ContentRow) -> Self {
        Self {
            kind: ContentKind::of(&row),
            row,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !self.kind.is_container()
    }

    /// Name shown in the tree
    pub fn display_name(&self) -> &str {
        &self.row.name
    }
}

/// Category of a blackboard artifact type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    DataArtifact,
    AnalysisResult,
}

/// One attribute row joined to its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub artifact_id: i64,
    pub attribute_type_id: i32,
    pub value_text: Option<String>,
    pub value_int32: Option<i64>,
}

impl AttributeRow {
    /// Text value, falling back to the integer value rendered as text
    pub fn value_as_string(&self) -> Option<String> {
        match &self.value_text {
            Some(text) if !text.is_empty() => Some(text.clone()),
            _ => self.value_int32.map(|v| v.to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_row(id: i64, name: &str) -> ContentRow {
    ContentRow {
        id,
        name: name.to_string(),
        size: 0,
        file_type: tsk::FILE_TYPE_FS,
        dir_type: tsk::NAME_TYPE_REG,
        meta_type: tsk::META_TYPE_REG,
        dir_flags: tsk::NAME_FLAG_ALLOC,
        meta_flags: 0,
        known: None,
        extension: None,
        mime_type: None,
        data_source_id: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_dispatch() {
        let mut row = test_row(1, "report.pdf");
        assert_eq!(ContentKind::of(&row), ContentKind::File);

        row.meta_type = tsk::META_TYPE_DIR;
        assert_eq!(ContentKind::of(&row), ContentKind::Directory);

        row.file_type = tsk::FILE_TYPE_SLACK;
        assert_eq!(ContentKind::of(&row), ContentKind::SlackFile);

        row.file_type = tsk::FILE_TYPE_UNALLOC_BLOCKS;
        assert_eq!(ContentKind::of(&row), ContentKind::LayoutFile);
    }

    #[test]
    fn test_node_kind_fixed_at_creation() {
        let node = ContentNode::from_row(test_row(7, "carved.jpg"));
        assert_eq!(node.kind, ContentKind::File);
        assert!(node.is_leaf());
        assert_eq!(node.display_name(), "carved.jpg");
    }

    #[test]
    fn test_attribute_value_fallback() {
        let text = AttributeRow {
            artifact_id: 1,
            attribute_type_id: tsk::ATTRIBUTE_SET_NAME,
            value_text: Some("A".into()),
            value_int32: None,
        };
        assert_eq!(text.value_as_string().as_deref(), Some("A"));

        let int = AttributeRow {
            artifact_id: 1,
            attribute_type_id: tsk::ATTRIBUTE_KEYWORD_SEARCH_TYPE,
            value_text: Some(String::new()),
            value_int32: Some(1),
        };
        assert_eq!(int.value_as_string().as_deref(), Some("1"));
    }

    #[test]
    fn test_known_and_slack_flags() {
        let mut row = test_row(3, "kernel32.dll");
        assert!(!row.is_known());
        row.known = Some(tsk::KNOWN_KNOWN);
        row.file_type = tsk::FILE_TYPE_SLACK;
        assert!(row.is_known());
        assert!(row.is_slack());
    }
}
