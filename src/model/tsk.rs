//! Numeric values of the case database enumerations the view clauses test.
//!
//! These mirror the stored integer columns of `tsk_files`,
//! `tsk_aggregate_score` and the blackboard tables.

// =============================================================================
// tsk_files.type
// =============================================================================

pub const FILE_TYPE_FS: i32 = 0;
pub const FILE_TYPE_CARVED: i32 = 1;
pub const FILE_TYPE_DERIVED: i32 = 2;
pub const FILE_TYPE_LOCAL: i32 = 3;
pub const FILE_TYPE_UNALLOC_BLOCKS: i32 = 4;
pub const FILE_TYPE_UNUSED_BLOCKS: i32 = 5;
pub const FILE_TYPE_VIRTUAL_DIR: i32 = 6;
pub const FILE_TYPE_SLACK: i32 = 7;
pub const FILE_TYPE_LOCAL_DIR: i32 = 8;
pub const FILE_TYPE_LAYOUT_FILE: i32 = 9;

// =============================================================================
// Name / meta flags and types
// =============================================================================

pub const NAME_FLAG_ALLOC: i32 = 1;
pub const NAME_FLAG_UNALLOC: i32 = 2;

pub const META_FLAG_ORPHAN: i32 = 32;

/// `dir_type` of a regular file
pub const NAME_TYPE_REG: i32 = 5;
/// `dir_type` of a directory
pub const NAME_TYPE_DIR: i32 = 3;

pub const META_TYPE_REG: i32 = 1;
pub const META_TYPE_DIR: i32 = 2;

// =============================================================================
// Known status
// =============================================================================

pub const KNOWN_KNOWN: i32 = 1;

// =============================================================================
// Aggregate score
// =============================================================================

pub const SIGNIFICANCE_LIKELY_NOTABLE: i32 = 9;
pub const SIGNIFICANCE_NOTABLE: i32 = 10;

pub const PRIORITY_NORMAL: i32 = 0;
pub const PRIORITY_OVERRIDE: i32 = 10;

// =============================================================================
// Blackboard
// =============================================================================

pub const ARTIFACT_KEYWORD_HIT: i32 = 9;
pub const ARTIFACT_HASHSET_HIT: i32 = 10;
pub const ARTIFACT_INTERESTING_FILE_HIT: i32 = 12;
pub const ARTIFACT_EMAIL_MSG: i32 = 13;
pub const ARTIFACT_INTERESTING_ARTIFACT_HIT: i32 = 35;

pub const ATTRIBUTE_PATH: i32 = 8;
pub const ATTRIBUTE_KEYWORD: i32 = 10;
pub const ATTRIBUTE_KEYWORD_REGEXP: i32 = 11;
pub const ATTRIBUTE_SET_NAME: i32 = 37;
pub const ATTRIBUTE_KEYWORD_SEARCH_TYPE: i32 = 122;
