//! Filters and the WHERE-clause builder for the content views

mod builder;
mod filters;

pub use builder::{
    build_where_clause, email_path_attributes_query, keyword_attributes_query, row_limit,
    set_name_attributes_query, QueryPreferences, DELETED_CONTENT_DISPLAY_LIMIT, DELETED_CONTENT_QUERY_LIMIT,
};
pub use filters::*;
