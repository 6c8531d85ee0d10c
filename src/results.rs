//! Analysis-result aggregations shown under the results tree
//!
//! Set-hit results group artifact ids by set name; keyword results group
//! them by list, keyword and matched instance; email results group messages
//! by account and folder. Each aggregation is rebuilt
//! from the database in one piece and swapped in atomically, so readers on
//! other threads only ever see a complete map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{CoreError, CoreResult};
use crate::events::Hook;
use crate::gateway::CaseQueryGateway;
use crate::model::{tsk, AttributeRow};
use crate::query::{
    email_path_attributes_query, keyword_attributes_query, set_name_attributes_query,
};
use crate::refresh::{RefreshBus, RefreshEvent};

pub const SIMPLE_LITERAL_SEARCH: &str = "Single Literal Keyword Search";
pub const SIMPLE_REGEX_SEARCH: &str = "Single Regular Expression Search";

/// Instance key used for literal and substring hits, which have no
/// per-instance layer
pub const DEFAULT_INSTANCE_NAME: &str = "DEFAULT_INSTANCE_NAME";

/// `TSK_KEYWORD_SEARCH_TYPE` value of a substring search
const SUBSTRING_SEARCH_TYPE: &str = "1";

/// Account and folder of messages whose path is too short to name them
pub const DEFAULT_MAIL_ACCOUNT: &str = "Default";
pub const DEFAULT_MAIL_FOLDER: &str = "Default";

// =============================================================================
// Shared plumbing
// =============================================================================

/// Current aggregation plus the number of successful rebuilds
struct Swapped<T> {
    current: Mutex<Arc<T>>,
    generation: AtomicU64,
}

impl<T> Swapped<T> {
    fn new(initial: T) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
            generation: AtomicU64::new(0),
        }
    }

    fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn swap(&self, next: T) -> u64 {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Channel told to reload after every rebuild
struct UpdateChannel {
    bus: Arc<RefreshBus>,
    name: String,
}

impl UpdateChannel {
    fn notify(&self) {
        match self.bus.publish(&self.name, RefreshEvent::RefreshKeys) {
            Ok(_) | Err(CoreError::StaleChannel(_)) => {}
            Err(e) => debug!(channel = %self.name, error = %e, "Result refresh not delivered"),
        }
    }
}

/// Attribute values per artifact, keyed by attribute type
fn attributes_by_artifact(rows: Vec<AttributeRow>) -> BTreeMap<i64, HashMap<i32, String>> {
    let mut artifacts: BTreeMap<i64, HashMap<i32, String>> = BTreeMap::new();
    for row in rows {
        let entry = artifacts.entry(row.artifact_id).or_default();
        if let Some(value) = row.value_as_string() {
            entry.insert(row.attribute_type_id, value);
        }
    }
    artifacts
}

// =============================================================================
// Set hits
// =============================================================================

pub type SetMap = BTreeMap<String, BTreeSet<i64>>;

/// Hash set hits or interesting item hits grouped by set name
pub struct SetHitResults {
    gateway: Arc<dyn CaseQueryGateway>,
    artifact_type_id: i32,
    query: String,
    map: Swapped<SetMap>,
    channel: Option<UpdateChannel>,
}

impl SetHitResults {
    pub fn new(
        gateway: Arc<dyn CaseQueryGateway>,
        artifact_type_id: i32,
        data_source_id: Option<i64>,
    ) -> CoreResult<Self> {
        let query = set_name_attributes_query(artifact_type_id, data_source_id)?;
        Ok(Self {
            gateway,
            artifact_type_id,
            query,
            map: Swapped::new(SetMap::new()),
            channel: None,
        })
    }

    /// Publish `RefreshKeys` on `channel` after every successful update
    pub fn with_channel(mut self, bus: Arc<RefreshBus>, channel: impl Into<String>) -> Self {
        self.channel = Some(UpdateChannel {
            bus,
            name: channel.into(),
        });
        self
    }

    pub fn artifact_type_id(&self) -> i32 {
        self.artifact_type_id
    }

    /// Rebuild from the database. On failure the previous map stays in place.
    pub fn update(&self) -> CoreResult<u64> {
        let rows = match self.gateway.execute_attribute_query(&self.query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    artifact_type = self.artifact_type_id,
                    error = %e,
                    "Failed to load set hits, keeping previous results"
                );
                return Err(e);
            }
        };

        let mut sets = SetMap::new();
        for row in rows {
            if row.attribute_type_id != tsk::ATTRIBUTE_SET_NAME {
                continue;
            }
            if let Some(name) = row.value_as_string() {
                sets.entry(name).or_default().insert(row.artifact_id);
            }
        }

        let set_count = sets.len();
        let generation = self.map.swap(sets);
        debug!(
            artifact_type = self.artifact_type_id,
            sets = set_count,
            generation,
            "Set hits updated"
        );
        if let Some(channel) = &self.channel {
            channel.notify();
        }
        Ok(generation)
    }

    /// Set names, sorted
    pub fn get_set_names(&self) -> Vec<String> {
        self.map.load().keys().cloned().collect()
    }

    pub fn get_artifact_ids(&self, set_name: &str) -> BTreeSet<i64> {
        self.map.load().get(set_name).cloned().unwrap_or_default()
    }

    /// Consistent view of the whole map
    pub fn snapshot(&self) -> Arc<SetMap> {
        self.map.load()
    }

    pub fn generation(&self) -> u64 {
        self.map.generation()
    }

    /// Hook for a view invalidator; failures are already logged by `update`
    pub fn refresh_hook(self: &Arc<Self>) -> Hook {
        let results = Arc::clone(self);
        Arc::new(move || {
            let _ = results.update();
        })
    }
}

// =============================================================================
// Keyword hits
// =============================================================================

/// Matched instance -> artifact ids
pub type InstanceMap = BTreeMap<String, BTreeSet<i64>>;
/// Keyword or regular expression -> instances
pub type KeywordMap = BTreeMap<String, InstanceMap>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordTree {
    literal: KeywordMap,
    regex: KeywordMap,
    lists: BTreeMap<String, KeywordMap>,
}

impl KeywordTree {
    fn from_artifacts(artifacts: BTreeMap<i64, HashMap<i32, String>>) -> Self {
        let mut tree = KeywordTree::default();

        for (id, attributes) in artifacts {
            let list = attributes.get(&tsk::ATTRIBUTE_SET_NAME);
            let word = attributes.get(&tsk::ATTRIBUTE_KEYWORD);
            let regexp = attributes.get(&tsk::ATTRIBUTE_KEYWORD_REGEXP);
            let substring = attributes
                .get(&tsk::ATTRIBUTE_KEYWORD_SEARCH_TYPE)
                .is_some_and(|t| t == SUBSTRING_SEARCH_TYPE);

            let target = match list {
                Some(list) => tree.lists.entry(list.clone()).or_default(),
                None if regexp.is_some() && !substring => &mut tree.regex,
                None => &mut tree.literal,
            };

            match (regexp, word) {
                // Substring hits store the searched term in the regexp attribute
                (Some(term), _) if substring => add_literal(target, term, id),
                (Some(pattern), Some(word)) => add_instance(target, pattern, word, id),
                (Some(pattern), None) => add_literal(target, pattern, id),
                (None, Some(word)) => add_literal(target, word, id),
                (None, None) => trace!(artifact = id, "Keyword hit without a term"),
            }
        }
        tree
    }

    fn list(&self, list_name: &str) -> Option<&KeywordMap> {
        match list_name {
            SIMPLE_LITERAL_SEARCH => Some(&self.literal),
            SIMPLE_REGEX_SEARCH => Some(&self.regex),
            other => self.lists.get(other),
        }
    }

    /// The two single-search groups first, then keyword lists by name
    pub fn list_names(&self) -> Vec<String> {
        [SIMPLE_LITERAL_SEARCH, SIMPLE_REGEX_SEARCH]
            .into_iter()
            .map(str::to_string)
            .chain(self.lists.keys().cloned())
            .collect()
    }

    pub fn keywords(&self, list_name: &str) -> Vec<String> {
        self.list(list_name)
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn keyword_instances(&self, list_name: &str, keyword: &str) -> Vec<String> {
        self.list(list_name)
            .and_then(|l| l.get(keyword))
            .map(|i| i.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn artifact_ids(&self, list_name: &str, keyword: &str, instance: &str) -> BTreeSet<i64> {
        self.list(list_name)
            .and_then(|l| l.get(keyword))
            .and_then(|i| i.get(instance))
            .cloned()
            .unwrap_or_default()
    }

    /// Every artifact id under a keyword, across its instances
    pub fn keyword_artifact_ids(&self, list_name: &str, keyword: &str) -> BTreeSet<i64> {
        self.list(list_name)
            .and_then(|l| l.get(keyword))
            .map(|i| i.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Literal and substring keywords have no instance layer of their own
    pub fn has_only_default_instance(&self, list_name: &str, keyword: &str) -> bool {
        let instances = self.keyword_instances(list_name, keyword);
        instances.len() == 1 && instances[0] == DEFAULT_INSTANCE_NAME
    }
}

fn add_literal(map: &mut KeywordMap, keyword: &str, artifact_id: i64) {
    add_instance(map, keyword, DEFAULT_INSTANCE_NAME, artifact_id);
}

fn add_instance(map: &mut KeywordMap, keyword: &str, instance: &str, artifact_id: i64) {
    map.entry(keyword.to_string())
        .or_default()
        .entry(instance.to_string())
        .or_default()
        .insert(artifact_id);
}

/// Keyword hits grouped by list, keyword and instance
pub struct KeywordResults {
    gateway: Arc<dyn CaseQueryGateway>,
    query: String,
    tree: Swapped<KeywordTree>,
    channel: Option<UpdateChannel>,
}

impl KeywordResults {
    pub fn new(gateway: Arc<dyn CaseQueryGateway>, data_source_id: Option<i64>) -> CoreResult<Self> {
        let query = keyword_attributes_query(data_source_id)?;
        Ok(Self {
            gateway,
            query,
            tree: Swapped::new(KeywordTree::default()),
            channel: None,
        })
    }

    pub fn with_channel(mut self, bus: Arc<RefreshBus>, channel: impl Into<String>) -> Self {
        self.channel = Some(UpdateChannel {
            bus,
            name: channel.into(),
        });
        self
    }

    /// Rebuild from the database. On failure the previous tree stays in place.
    pub fn update(&self) -> CoreResult<u64> {
        let rows = match self.gateway.execute_attribute_query(&self.query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to load keyword hits, keeping previous results");
                return Err(e);
            }
        };

        let tree = KeywordTree::from_artifacts(attributes_by_artifact(rows));
        let generation = self.tree.swap(tree);
        debug!(generation, "Keyword hits updated");
        if let Some(channel) = &self.channel {
            channel.notify();
        }
        Ok(generation)
    }

    pub fn snapshot(&self) -> Arc<KeywordTree> {
        self.tree.load()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.tree.load().list_names()
    }

    pub fn keywords(&self, list_name: &str) -> Vec<String> {
        self.tree.load().keywords(list_name)
    }

    pub fn keyword_instances(&self, list_name: &str, keyword: &str) -> Vec<String> {
        self.tree.load().keyword_instances(list_name, keyword)
    }

    pub fn artifact_ids(&self, list_name: &str, keyword: &str, instance: &str) -> BTreeSet<i64> {
        self.tree.load().artifact_ids(list_name, keyword, instance)
    }

    pub fn generation(&self) -> u64 {
        self.tree.generation()
    }

    pub fn refresh_hook(self: &Arc<Self>) -> Hook {
        let results = Arc::clone(self);
        Arc::new(move || {
            let _ = results.update();
        })
    }
}

// =============================================================================
// Email messages
// =============================================================================

/// Folder -> message artifact ids
pub type FolderMap = BTreeMap<String, BTreeSet<i64>>;
/// Account -> folders
pub type AccountMap = BTreeMap<String, FolderMap>;

/// Account and folder named by a message path such as
/// `/mbox/alice@example.com/Inbox/msg1`. Empty trailing segments are ignored;
/// fewer than four segments fall back to the default account and folder.
pub fn parse_mail_path(path: &str) -> (String, String) {
    let mut segments: Vec<&str> = path.split('/').collect();
    while segments.last() == Some(&"") {
        segments.pop();
    }
    if segments.len() < 4 {
        return (
            DEFAULT_MAIL_ACCOUNT.to_string(),
            DEFAULT_MAIL_FOLDER.to_string(),
        );
    }
    (segments[2].to_string(), segments[3].to_string())
}

/// Email messages grouped by account and folder
pub struct EmailResults {
    gateway: Arc<dyn CaseQueryGateway>,
    query: String,
    accounts: Swapped<AccountMap>,
    channel: Option<UpdateChannel>,
}

impl EmailResults {
    pub fn new(gateway: Arc<dyn CaseQueryGateway>, data_source_id: Option<i64>) -> CoreResult<Self> {
        let query = email_path_attributes_query(data_source_id)?;
        Ok(Self {
            gateway,
            query,
            accounts: Swapped::new(AccountMap::new()),
            channel: None,
        })
    }

    pub fn with_channel(mut self, bus: Arc<RefreshBus>, channel: impl Into<String>) -> Self {
        self.channel = Some(UpdateChannel {
            bus,
            name: channel.into(),
        });
        self
    }

    /// Rebuild from the database. On failure the previous map stays in place.
    pub fn update(&self) -> CoreResult<u64> {
        let rows = match self.gateway.execute_attribute_query(&self.query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to load email messages, keeping previous results");
                return Err(e);
            }
        };

        let mut accounts = AccountMap::new();
        for row in rows {
            if row.attribute_type_id != tsk::ATTRIBUTE_PATH {
                continue;
            }
            let path = row.value_as_string().unwrap_or_default();
            let (account, folder) = parse_mail_path(&path);
            accounts
                .entry(account)
                .or_default()
                .entry(folder)
                .or_default()
                .insert(row.artifact_id);
        }

        let account_count = accounts.len();
        let generation = self.accounts.swap(accounts);
        debug!(accounts = account_count, generation, "Email messages updated");
        if let Some(channel) = &self.channel {
            channel.notify();
        }
        Ok(generation)
    }

    /// Account names, sorted
    pub fn get_accounts(&self) -> Vec<String> {
        self.accounts.load().keys().cloned().collect()
    }

    pub fn get_folders(&self, account: &str) -> Vec<String> {
        self.accounts
            .load()
            .get(account)
            .map(|folders| folders.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_artifact_ids(&self, account: &str, folder: &str) -> BTreeSet<i64> {
        self.accounts
            .load()
            .get(account)
            .and_then(|folders| folders.get(folder))
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Arc<AccountMap> {
        self.accounts.load()
    }

    pub fn generation(&self) -> u64 {
        self.accounts.generation()
    }

    pub fn refresh_hook(self: &Arc<Self>) -> Hook {
        let results = Arc::clone(self);
        Arc::new(move || {
            let _ = results.update();
        })
    }
}
