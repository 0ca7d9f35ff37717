use std::sync::LazyLock;

use chrono::NaiveDate;
use log::debug;

use crate::config::Config;
use crate::doc::DocType;
use crate::error::{Error, Result};
use crate::meta::Registry;
use crate::store::{Action, AllowAll, Discard, DocumentStore, Notifier, PermissionChecker};

static ALLOW_ALL: AllowAll = AllowAll;
static DISCARD: Discard = Discard;
static EMPTY_REGISTRY: Registry = Registry::empty();
static DEFAULT_CONFIG: LazyLock<Config> = LazyLock::new(Config::default);

/// Request-scoped context: who is calling, and the host collaborators the
/// operation may use. Every operation takes one explicitly.
pub struct Ctx<'a> {
    user: String,
    roles: Vec<String>,
    store: &'a dyn DocumentStore,
    permissions: &'a dyn PermissionChecker,
    notifier: &'a dyn Notifier,
    registry: &'a Registry,
    config: &'a Config,
    today: NaiveDate,
}

impl<'a> Ctx<'a> {
    pub fn builder(user: impl Into<String>, store: &'a dyn DocumentStore) -> CtxBuilder<'a> {
        CtxBuilder {
            user: user.into(),
            roles: Vec::new(),
            store,
            permissions: &ALLOW_ALL,
            notifier: &DISCARD,
            registry: &EMPTY_REGISTRY,
            config: &DEFAULT_CONFIG,
            today: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn store(&self) -> &'a dyn DocumentStore {
        self.store
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Date the request runs on, used for posting dates and naming series.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn has_permission(&self, doctype: &DocType, action: Action) -> bool {
        self.permissions
            .has_permission(&self.user, &self.roles, doctype, action)
    }

    /// Fail with [Error::Permission] unless the caller may perform the action.
    pub fn check_permission(&self, doctype: &DocType, action: Action) -> Result<()> {
        if self.has_permission(doctype, action) {
            Ok(())
        } else {
            debug!("{} denied {action} on {doctype}", self.user);
            Err(Error::Permission {
                user: self.user.clone(),
                doctype: doctype.clone(),
                action: action.to_string(),
            })
        }
    }

    pub fn msgprint(&self, message: &str) {
        debug!("Message to {}: {message}", self.user);
        self.notifier.msgprint(&self.user, message);
    }

    pub fn publish_realtime(&self, event: &str, payload: serde_json::Value) {
        self.notifier.publish_realtime(event, payload, &self.user);
    }
}

pub struct CtxBuilder<'a> {
    user: String,
    roles: Vec<String>,
    store: &'a dyn DocumentStore,
    permissions: &'a dyn PermissionChecker,
    notifier: &'a dyn Notifier,
    registry: &'a Registry,
    config: &'a Config,
    today: Option<NaiveDate>,
}

impl<'a> CtxBuilder<'a> {
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults to granting everything, for hosts that check permissions themselves.
    pub fn permissions(mut self, permissions: &'a dyn PermissionChecker) -> Self {
        self.permissions = permissions;
        self
    }

    /// Defaults to dropping notifications.
    pub fn notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Defaults to an empty registry, which treats every doctype as open.
    pub fn registry(mut self, registry: &'a Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: &'a Config) -> Self {
        self.config = config;
        self
    }

    /// Defaults to the local date.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn build(self) -> Ctx<'a> {
        Ctx {
            user: self.user,
            roles: self.roles,
            store: self.store,
            permissions: self.permissions,
            notifier: self.notifier,
            registry: self.registry,
            config: self.config,
            today: self
                .today
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, RecordingNotifier, RolePermissions};

    #[test]
    fn defaults() {
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        assert_eq!(ctx.user(), "jane");
        assert!(ctx.registry().doctypes().is_empty());
        assert_eq!(ctx.config().bulk.progress_threshold, 5);
        assert!(ctx.has_permission(&DocType::new("Item").unwrap(), Action::Delete));
    }

    #[test]
    fn permission_check_and_messages() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let item = DocType::new("Item").unwrap();
        let perms = RolePermissions::new().grant(&item, Action::Write, "Item Manager");
        let ctx = Ctx::builder("jane", &store)
            .roles(["Sales User"])
            .permissions(&perms)
            .notifier(&notifier)
            .build();

        let err = ctx.check_permission(&item, Action::Write).unwrap_err();
        assert_eq!(err.to_string(), "Not permitted: jane cannot write Item");

        ctx.msgprint("hello");
        assert_eq!(notifier.messages(), ["hello"]);
    }
}
