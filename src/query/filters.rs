//! Filter descriptors for the content views
//!
//! Each view has a closed set of filters (size buckets, deleted modes, score
//! severities). Extension and MIME filters can also be constructed at runtime,
//! which is where empty criteria lists get rejected.

use serde::Serialize;

use crate::error::{CoreError, CoreResult};

/// Common identity of every filter
pub trait FilterDescriptor {
    fn id(&self) -> i32;
    /// Short, stable name; also used to build refresh channel names
    fn name(&self) -> &str;
    fn display_name(&self) -> &str;
}

// =============================================================================
// Closed sets
// =============================================================================

/// Files-by-size buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileSizeFilter {
    Size50To200,
    Size200To1000,
    Size1000Plus,
}

impl FileSizeFilter {
    pub const ALL: [FileSizeFilter; 3] = [
        FileSizeFilter::Size50To200,
        FileSizeFilter::Size200To1000,
        FileSizeFilter::Size1000Plus,
    ];

    /// Inclusive lower and exclusive upper bound in bytes
    pub fn bounds(&self) -> (i64, Option<i64>) {
        match self {
            FileSizeFilter::Size50To200 => (50_000_000, Some(200_000_000)),
            FileSizeFilter::Size200To1000 => (200_000_000, Some(1_000_000_000)),
            FileSizeFilter::Size1000Plus => (1_000_000_000, None),
        }
    }
}

impl FilterDescriptor for FileSizeFilter {
    fn id(&self) -> i32 {
        match self {
            FileSizeFilter::Size50To200 => 0,
            FileSizeFilter::Size200To1000 => 1,
            FileSizeFilter::Size1000Plus => 2,
        }
    }

    fn name(&self) -> &str {
        match self {
            FileSizeFilter::Size50To200 => "SIZE_50_200",
            FileSizeFilter::Size200To1000 => "SIZE_200_1GB",
            FileSizeFilter::Size1000Plus => "SIZE_1000+",
        }
    }

    fn display_name(&self) -> &str {
        match self {
            FileSizeFilter::Size50To200 => "50 - 200MB",
            FileSizeFilter::Size200To1000 => "200MB - 1GB",
            FileSizeFilter::Size1000Plus => "1GB+",
        }
    }
}

/// Deleted content modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeletedContentFilter {
    /// Unallocated name entries of file system files, orphans excluded
    FsDeleted,
    /// Unallocated or orphan file system files, plus carved files
    AllDeleted,
}

impl DeletedContentFilter {
    pub const ALL: [DeletedContentFilter; 2] =
        [DeletedContentFilter::FsDeleted, DeletedContentFilter::AllDeleted];
}

impl FilterDescriptor for DeletedContentFilter {
    fn id(&self) -> i32 {
        match self {
            DeletedContentFilter::FsDeleted => 0,
            DeletedContentFilter::AllDeleted => 1,
        }
    }

    fn name(&self) -> &str {
        match self {
            DeletedContentFilter::FsDeleted => "FS_DELETED_FILTER",
            DeletedContentFilter::AllDeleted => "ALL_DELETED_FILTER",
        }
    }

    fn display_name(&self) -> &str {
        match self {
            DeletedContentFilter::FsDeleted => "File System",
            DeletedContentFilter::AllDeleted => "All",
        }
    }
}

/// Aggregate score severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScoreFilter {
    BadItems,
    SuspiciousItems,
}

impl ScoreFilter {
    pub const ALL: [ScoreFilter; 2] = [ScoreFilter::BadItems, ScoreFilter::SuspiciousItems];
}

impl FilterDescriptor for ScoreFilter {
    fn id(&self) -> i32 {
        match self {
            ScoreFilter::BadItems => 0,
            ScoreFilter::SuspiciousItems => 1,
        }
    }

    fn name(&self) -> &str {
        match self {
            ScoreFilter::BadItems => "BAD_ITEM_FILTER",
            ScoreFilter::SuspiciousItems => "SUS_ITEM_FILTER",
        }
    }

    fn display_name(&self) -> &str {
        match self {
            ScoreFilter::BadItems => "Bad Items",
            ScoreFilter::SuspiciousItems => "Suspicious Items",
        }
    }
}

// =============================================================================
// Criteria-based filters
// =============================================================================

/// Files grouped by name extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExtensionFilter {
    id: i32,
    name: String,
    display_name: String,
    /// Stored with a leading dot, as given
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        display_name: impl Into<String>,
        extensions: Vec<String>,
    ) -> CoreResult<Self> {
        let name = name.into();
        if extensions.is_empty() {
            return Err(CoreError::Configuration(format!(
                "Extension filter {} has no extensions",
                name
            )));
        }
        Ok(Self {
            id,
            name,
            display_name: display_name.into(),
            extensions,
        })
    }

    fn builtin(id: i32, name: &str, display_name: &str, extensions: &[&str]) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Top level groups of the "File Types > By Extension" tree
    pub fn root_filters() -> Vec<ExtensionFilter> {
        vec![
            Self::builtin(0, "TSK_IMAGE_FILTER", "Images", IMAGE_EXTENSIONS),
            Self::builtin(1, "TSK_VIDEO_FILTER", "Videos", VIDEO_EXTENSIONS),
            Self::builtin(2, "TSK_AUDIO_FILTER", "Audio", AUDIO_EXTENSIONS),
            Self::builtin(3, "TSK_ARCHIVE_FILTER", "Archives", ARCHIVE_EXTENSIONS),
            Self::builtin(4, "TSK_DATABASE_FILTER", "Databases", DATABASE_EXTENSIONS),
            Self::builtin(
                5,
                "TSK_DOCUMENT_FILTER",
                "Documents",
                &[
                    ".htm", ".html", ".doc", ".docx", ".odt", ".xls", ".xlsx", ".ppt", ".pptx",
                    ".pdf", ".txt", ".rtf",
                ],
            ),
            Self::builtin(
                6,
                "TSK_EXECUTABLE_FILTER",
                "Executable",
                &[".exe", ".dll", ".bat", ".cmd", ".com"],
            ),
        ]
    }

    pub fn document_filters() -> Vec<ExtensionFilter> {
        vec![
            Self::builtin(0, "AUT_DOC_HTML", "HTML", &[".htm", ".html"]),
            Self::builtin(
                1,
                "AUT_DOC_OFFICE",
                "Office",
                &[".doc", ".docx", ".odt", ".xls", ".xlsx", ".ppt", ".pptx"],
            ),
            Self::builtin(2, "AUT_DOC_PDF", "PDF", &[".pdf"]),
            Self::builtin(3, "AUT_DOC_TXT", "Plain Text", &[".txt"]),
            Self::builtin(4, "AUT_DOC_RTF", "Rich Text", &[".rtf"]),
        ]
    }

    pub fn executable_filters() -> Vec<ExtensionFilter> {
        [".exe", ".dll", ".bat", ".cmd", ".com"]
            .iter()
            .enumerate()
            .map(|(i, ext)| {
                let name = format!("ExecutableFilter_{}", ext[1..].to_uppercase());
                Self::builtin(i as i32, &name, ext, &[ext])
            })
            .collect()
    }

    pub fn event_logs() -> ExtensionFilter {
        Self::builtin(0, "EVENT_LOG_FILTER", "Event Logs", &[".evtx", ".evt"])
    }
}

impl FilterDescriptor for ExtensionFilter {
    fn id(&self) -> i32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}

/// Files grouped by detected MIME type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MimeTypeFilter {
    name: String,
    media_type: String,
    subtypes: Vec<String>,
}

impl MimeTypeFilter {
    pub fn new(media_type: impl Into<String>, subtypes: Vec<String>) -> CoreResult<Self> {
        let media_type = media_type.into();
        if media_type.is_empty() || subtypes.is_empty() {
            return Err(CoreError::Configuration(format!(
                "MIME filter '{}' needs a media type and at least one subtype",
                media_type
            )));
        }
        Ok(Self {
            name: format!("MIME_{}", media_type.to_uppercase()),
            media_type,
            subtypes,
        })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Full `type/subtype` strings
    pub fn mime_types(&self) -> Vec<String> {
        self.subtypes
            .iter()
            .map(|s| format!("{}/{}", self.media_type, s))
            .collect()
    }
}

impl FilterDescriptor for MimeTypeFilter {
    fn id(&self) -> i32 {
        0
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.media_type
    }
}

// =============================================================================
// View filter
// =============================================================================

/// Any filter a file view can be built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "view", content = "filter", rename_all = "snake_case")]
pub enum ViewFilter {
    Size(FileSizeFilter),
    Deleted(DeletedContentFilter),
    Score(ScoreFilter),
    Extension(ExtensionFilter),
    MimeType(MimeTypeFilter),
}

impl ViewFilter {
    /// Name of the view this filter belongs to
    pub fn view_name(&self) -> &'static str {
        match self {
            ViewFilter::Size(_) => "FileSize",
            ViewFilter::Deleted(_) => "DeletedContent",
            ViewFilter::Score(_) => "ScoreContent",
            ViewFilter::Extension(_) => "FileTypesByExtension",
            ViewFilter::MimeType(_) => "FileTypesByMimeType",
        }
    }

    fn descriptor(&self) -> &dyn FilterDescriptor {
        match self {
            ViewFilter::Size(f) => f,
            ViewFilter::Deleted(f) => f,
            ViewFilter::Score(f) => f,
            ViewFilter::Extension(f) => f,
            ViewFilter::MimeType(f) => f,
        }
    }

    /// Refresh channel name for the branch showing this filter
    pub fn channel_name(&self, data_source_id: Option<i64>) -> String {
        match data_source_id {
            Some(ds) if ds > 0 => format!("{}_{}_{}", self.view_name(), self.name(), ds),
            _ => format!("{}_{}", self.view_name(), self.name()),
        }
    }
}

impl FilterDescriptor for ViewFilter {
    fn id(&self) -> i32 {
        self.descriptor().id()
    }

    fn name(&self) -> &str {
        self.descriptor().name()
    }

    fn display_name(&self) -> &str {
        self.descriptor().display_name()
    }
}

// =============================================================================
// Extension groups
// =============================================================================

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".psd", ".nef", ".tiff", ".tif", ".bmp", ".tec", ".gif", ".heic",
    ".heif", ".webp",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    ".aaf", ".3gp", ".asf", ".avi", ".m1v", ".m2v", ".m4v", ".mp4", ".mov", ".mpeg", ".mpg",
    ".mpe", ".rm", ".wmv", ".mpv", ".flv", ".swf", ".mkv", ".webm",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    ".aiff", ".aif", ".flac", ".wav", ".m4a", ".ape", ".wma", ".mp2", ".mp1", ".mp3", ".aac",
    ".mp4", ".m4p", ".m1a", ".m2a", ".m4r", ".mpa", ".m3u", ".mid", ".midi", ".ogg",
];

const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".zip", ".rar", ".7zip", ".7z", ".arj", ".tar", ".gzip", ".bzip", ".bzip2", ".cab", ".jar",
    ".cpio", ".ar", ".gz", ".tgz", ".bz2",
];

const DATABASE_EXTENSIONS: &[&str] = &[".db", ".db3", ".sqlite", ".sqlite3"];
