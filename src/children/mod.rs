//! Child factories backing the tree branches

mod factory;
mod views;

pub use factory::{AcceptAll, ChangeCallback, ChildFactory, ChildFilter, KeySource};
pub use views::{
    ContentChildren, FileViewChildren, KnownAndSlackFilter, NoticeCallback, OverLimitNotice,
};
