//! Access rule engine
//!
//! Per-collection, per-action, per-record and per-property authorization
//! rules, evaluated before every CRUD mutation or return. Resolution layers,
//! later layers overriding earlier ones (empty layers are skipped):
//!
//! 1. global wildcard default (permissive read, role-gated write)
//! 2. collection-level action rule
//! 3. collection wildcard per-property rules
//! 4. record-id-specific action and property rules
//!
//! A rule is a boolean, a role list (`Guest`/`User`/`Owner`) or a parsed
//! boolean expression over `user`/`data` (see [`expr`]). Property rules never
//! fail a request; they strip the property from the outgoing read payload or
//! the incoming write payload.

pub mod expr;

use crate::core::error::ServiceError;
use crate::core::record::{ID, OWNER_ID};
use anyhow::{bail, Context, Result};
use expr::Expr;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// CRUD action a request maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    fn key(self) -> &'static str {
        match self {
            Action::Create => ".create",
            Action::Read => ".read",
            Action::Update => ".update",
            Action::Delete => ".delete",
        }
    }
}

/// Requester roles a rule may name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    User,
    Owner,
}

/// A single resolved rule value
#[derive(Debug, Clone)]
pub enum Rule {
    Allow(bool),
    Roles(Vec<Role>),
    Expr(Arc<Expr>),
}

impl Rule {
    /// Empty rules are skipped during resolution, keeping the previous layer
    fn is_empty(&self) -> bool {
        matches!(self, Rule::Roles(roles) if roles.is_empty())
    }
}

/// A record-shaped rule node: action rules plus per-property sub-rules
#[derive(Debug, Clone, Default)]
struct RecordNode {
    actions: HashMap<&'static str, Rule>,
    props: HashMap<String, HashMap<&'static str, Rule>>,
}

#[derive(Debug, Clone, Default)]
struct CollectionNode {
    actions: HashMap<&'static str, Rule>,
    wildcard: RecordNode,
    records: HashMap<String, RecordNode>,
}

/// The full rule table for the server
#[derive(Debug, Clone)]
pub struct RuleSet {
    global: HashMap<&'static str, Rule>,
    collections: HashMap<String, CollectionNode>,
}

const ACTION_KEYS: [&str; 4] = [".create", ".read", ".update", ".delete"];

fn action_key(key: &str) -> Option<&'static str> {
    ACTION_KEYS.iter().find(|k| **k == key).copied()
}

fn parse_rule(value: &Value) -> Result<Option<Rule>> {
    match value {
        Value::Bool(allow) => Ok(Some(Rule::Allow(*allow))),
        Value::Array(roles) => {
            let roles = roles
                .iter()
                .map(|role| match role.as_str() {
                    Some("Guest") => Ok(Role::Guest),
                    Some("User") => Ok(Role::User),
                    Some("Owner") => Ok(Role::Owner),
                    other => bail!("unknown role {other:?}"),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Rule::Roles(roles)))
        }
        Value::String(source) if source.is_empty() => Ok(None),
        Value::String(source) => {
            let expr = Expr::parse(source)
                .with_context(|| format!("rule expression {source:?}"))?;
            Ok(Some(Rule::Expr(Arc::new(expr))))
        }
        other => bail!("unsupported rule value {other}"),
    }
}

fn parse_record_node(object: &Map<String, Value>) -> Result<RecordNode> {
    let mut node = RecordNode::default();
    for (key, value) in object {
        if let Some(action) = action_key(key) {
            if let Some(rule) = parse_rule(value)? {
                node.actions.insert(action, rule);
            }
        } else if let Some(prop_rules) = value.as_object() {
            let mut per_action = HashMap::new();
            for (prop_key, prop_value) in prop_rules {
                if let Some(action) = action_key(prop_key) {
                    if let Some(rule) = parse_rule(prop_value)? {
                        per_action.insert(action, rule);
                    }
                }
            }
            node.props.insert(key.clone(), per_action);
        }
    }
    Ok(node)
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(&Map::new()).expect("default rules are well formed")
    }
}

impl RuleSet {
    /// Build the rule table from a configuration payload
    ///
    /// Expressions are parsed here; a malformed rule is a configuration
    /// error, not a per-request one.
    pub fn new(config: &Map<String, Value>) -> Result<Self> {
        // Write actions are role-gated unless the config overrides them
        let mut global: HashMap<&'static str, Rule> = HashMap::from([
            (".create", Rule::Roles(vec![Role::User])),
            (".update", Rule::Roles(vec![Role::Owner])),
            (".delete", Rule::Roles(vec![Role::Owner])),
        ]);

        let mut collections = HashMap::new();
        for (collection, value) in config {
            let object = value
                .as_object()
                .with_context(|| format!("rules for {collection:?} must be an object"))?;
            if collection == "*" {
                global.clear();
                for (key, rule_value) in object {
                    if let Some(action) = action_key(key) {
                        if let Some(rule) = parse_rule(rule_value)? {
                            global.insert(action, rule);
                        }
                    }
                }
                continue;
            }

            let mut node = CollectionNode::default();
            for (key, entry) in object {
                if let Some(action) = action_key(key) {
                    if let Some(rule) = parse_rule(entry)? {
                        node.actions.insert(action, rule);
                    }
                } else if let Some(record_object) = entry.as_object() {
                    let record_node = parse_record_node(record_object)?;
                    if key == "*" {
                        node.wildcard = record_node;
                    } else {
                        node.records.insert(key.clone(), record_node);
                    }
                }
            }
            collections.insert(collection.clone(), node);
        }

        Ok(Self {
            global,
            collections,
        })
    }

    /// Layered rule lookup for one action on one collection/record
    fn resolve(
        &self,
        action: Action,
        collection: &str,
        record_id: Option<&str>,
    ) -> (Rule, Vec<(String, Rule)>) {
        let key = action.key();
        // Reads are permissive by default
        let mut current = self
            .global
            .get(key)
            .cloned()
            .unwrap_or(Rule::Allow(true));
        let mut prop_rules: Vec<(String, Rule)> = Vec::new();

        if let Some(node) = self.collections.get(collection) {
            if let Some(rule) = node.actions.get(key) {
                if !rule.is_empty() {
                    current = rule.clone();
                }
            }

            let wildcard_props = collect_prop_rules(&node.wildcard, key);
            if !wildcard_props.is_empty() {
                prop_rules = wildcard_props;
            }

            if let Some(record) = record_id.and_then(|id| node.records.get(id)) {
                if let Some(rule) = record.actions.get(key) {
                    if !rule.is_empty() {
                        current = rule.clone();
                    }
                }
                let record_props = collect_prop_rules(record, key);
                if !record_props.is_empty() {
                    prop_rules = record_props;
                }
            }
        }

        (current, prop_rules)
    }

    /// Authorize one request; strips denied properties as a side effect
    ///
    /// `data` is the existing record (or the outgoing read payload);
    /// `new_data` is the incoming write payload. Denial yields 403, or 401
    /// when a role rule demands authentication and none is present. The
    /// `X-Admin` override bypasses denial but not property stripping.
    pub fn can_access(
        &self,
        action: Action,
        collection: &str,
        user: Option<&Value>,
        is_admin: bool,
        data: Option<&mut Value>,
        new_data: Option<&mut Value>,
    ) -> Result<(), ServiceError> {
        let empty = Value::Object(Map::new());
        let record_id = data
            .as_ref()
            .and_then(|d| d.get(ID))
            .and_then(Value::as_str)
            .map(str::to_string);
        let (rule, prop_rules) = self.resolve(action, collection, record_id.as_deref());

        let bound_data: &Value = data.as_deref().unwrap_or(&empty);
        let allowed = match &rule {
            Rule::Allow(allow) => *allow,
            Rule::Expr(expr) => expr.evaluate(user, bound_data),
            Rule::Roles(roles) => check_roles(roles, user, is_admin, bound_data)?,
        };
        if !allowed && !is_admin {
            return Err(ServiceError::credential());
        }

        // Property rules strip rather than fail
        let denied: Vec<String> = prop_rules
            .into_iter()
            .filter(|(_, rule)| match rule {
                Rule::Allow(allow) => !*allow,
                Rule::Expr(expr) => !expr.evaluate(user, bound_data),
                // Role lists in property position never strip
                Rule::Roles(_) => false,
            })
            .map(|(prop, _)| prop)
            .collect();

        if !denied.is_empty() {
            let target = match action {
                Action::Create | Action::Update => new_data,
                Action::Read => data,
                Action::Delete => None,
            };
            if let Some(Value::Object(object)) = target {
                for prop in denied {
                    object.remove(&prop);
                }
            }
        }
        Ok(())
    }
}

fn collect_prop_rules(node: &RecordNode, action: &'static str) -> Vec<(String, Rule)> {
    node.props
        .iter()
        .filter_map(|(prop, rules)| {
            rules
                .get(action)
                .map(|rule| (prop.clone(), rule.clone()))
        })
        .collect()
}

fn check_roles(
    roles: &[Role],
    user: Option<&Value>,
    is_admin: bool,
    data: &Value,
) -> Result<bool, ServiceError> {
    if roles.contains(&Role::Guest) {
        return Ok(true);
    }
    if user.is_none() && !is_admin {
        return Err(ServiceError::authorization());
    }
    if roles.contains(&Role::User) {
        return Ok(true);
    }
    if let Some(user) = user {
        if roles.contains(&Role::Owner) {
            return Ok(user.get(ID) == data.get(OWNER_ID) && user.get(ID).is_some());
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ruleset(config: Value) -> RuleSet {
        RuleSet::new(config.as_object().unwrap()).unwrap()
    }

    fn user(id: &str) -> Value {
        json!({"_id": id, "email": "a@b.com"})
    }

    #[test]
    fn default_rules_allow_guest_reads() {
        let rules = RuleSet::default();
        let mut data = json!({"_id": "r1"});
        assert!(rules
            .can_access(Action::Read, "recipes", None, false, Some(&mut data), None)
            .is_ok());
    }

    #[test]
    fn default_rules_require_user_for_create() {
        let rules = RuleSet::default();
        let err = rules
            .can_access(Action::Create, "recipes", None, false, None, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        let creator = user("u1");
        assert!(rules
            .can_access(Action::Create, "recipes", Some(&creator), false, None, None)
            .is_ok());
    }

    #[test]
    fn default_rules_gate_updates_to_owner() {
        let rules = RuleSet::default();
        let owner = user("u1");
        let intruder = user("u2");
        let mut data = json!({"_id": "r1", "_ownerId": "u1"});

        assert!(rules
            .can_access(
                Action::Update,
                "recipes",
                Some(&owner),
                false,
                Some(&mut data),
                None
            )
            .is_ok());
        let err = rules
            .can_access(
                Action::Update,
                "recipes",
                Some(&intruder),
                false,
                Some(&mut data),
                None
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Credential(_)));
    }

    #[test]
    fn admin_header_overrides_denial() {
        let rules = RuleSet::default();
        let intruder = user("u2");
        let mut data = json!({"_id": "r1", "_ownerId": "u1"});
        assert!(rules
            .can_access(
                Action::Delete,
                "recipes",
                Some(&intruder),
                true,
                Some(&mut data),
                None
            )
            .is_ok());
    }

    #[test]
    fn collection_rules_override_global() {
        let rules = ruleset(json!({
            "users": {
                ".create": false,
                ".read": ["Owner"],
                ".update": false,
                ".delete": false
            }
        }));
        let requester = user("u1");
        let err = rules
            .can_access(Action::Create, "users", Some(&requester), false, None, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Credential(_)));

        // Owner can still read their own record
        let mut own = json!({"_id": "u1", "_ownerId": "u1"});
        assert!(rules
            .can_access(
                Action::Read,
                "users",
                Some(&requester),
                false,
                Some(&mut own),
                None
            )
            .is_ok());
    }

    #[test]
    fn expression_rules_bind_user_and_data() {
        let rules = ruleset(json!({
            "recipes": {".update": "user._id == data._ownerId || data.isPublic"}
        }));
        let editor = user("u2");
        let mut open = json!({"_id": "r1", "_ownerId": "u1", "isPublic": true});
        assert!(rules
            .can_access(
                Action::Update,
                "recipes",
                Some(&editor),
                false,
                Some(&mut open),
                None
            )
            .is_ok());

        let mut closed = json!({"_id": "r1", "_ownerId": "u1"});
        assert!(rules
            .can_access(
                Action::Update,
                "recipes",
                Some(&editor),
                false,
                Some(&mut closed),
                None
            )
            .is_err());
    }

    #[test]
    fn malformed_expression_is_a_config_error() {
        let config = json!({"recipes": {".read": "system('rm')"}});
        assert!(RuleSet::new(config.as_object().unwrap()).is_err());
    }

    #[test]
    fn property_rules_strip_read_payload() {
        let rules = ruleset(json!({
            "recipes": {"*": {"secretNote": {".read": false}}}
        }));
        let mut data = json!({"_id": "r1", "name": "Cake", "secretNote": "x"});
        rules
            .can_access(Action::Read, "recipes", None, false, Some(&mut data), None)
            .unwrap();
        assert!(data.get("secretNote").is_none());
        assert_eq!(data["name"], "Cake");
    }

    #[test]
    fn property_rules_strip_incoming_writes() {
        let rules = ruleset(json!({
            "recipes": {"*": {"likes": {".update": "user._id == data._ownerId"}}}
        }));
        let intruder = user("u2");
        let mut existing = json!({"_id": "r1", "_ownerId": "u1"});
        let mut body = json!({"name": "edit", "likes": 99});
        rules
            .can_access(
                Action::Update,
                "recipes",
                Some(&intruder),
                true, // admin bypasses denial but not stripping
                Some(&mut existing),
                Some(&mut body),
            )
            .unwrap();
        assert!(body.get("likes").is_none());
        assert_eq!(body["name"], "edit");
    }

    #[test]
    fn record_specific_rules_override_wildcard() {
        let rules = ruleset(json!({
            "recipes": {
                ".read": true,
                "locked-1": {".read": false}
            }
        }));
        let mut open = json!({"_id": "r1"});
        assert!(rules
            .can_access(Action::Read, "recipes", None, false, Some(&mut open), None)
            .is_ok());
        let mut locked = json!({"_id": "locked-1"});
        assert!(rules
            .can_access(Action::Read, "recipes", None, false, Some(&mut locked), None)
            .is_err());
    }
}
