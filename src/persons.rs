//! Identity resolution.
//!
//! Several (name, email) pairs usually belong to one human: a laptop and a
//! work machine configured differently, a renamed account, a typo fixed
//! halfway through a project. [`PersonsDb`] folds such pairs into one
//! [`Person`] whenever a name or an email is shared, case-insensitively.
//! Merging is transitive: a pair that matches two existing persons bridges
//! them into one, and the person seen first keeps its display name.

use crate::config::{Filters, IdentityPolicy};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersonId(usize);

#[derive(Debug, Clone)]
pub struct Person {
    pub id: PersonId,
    /// Display name, the first name seen for this person.
    pub name: String,
    pub names: BTreeSet<String>,
    pub emails: BTreeSet<String>,
    /// Set when any alias matches an author or email exclusion pattern.
    pub excluded: bool,
}

impl Person {
    fn new(id: PersonId, name: &str, email: &str) -> Self {
        let mut names = BTreeSet::new();
        names.insert(name.to_string());
        let mut emails = BTreeSet::new();
        if !email.is_empty() {
            emails.insert(email.to_string());
        }
        Self {
            id,
            name: name.to_string(),
            names,
            emails,
            excluded: false,
        }
    }

    /// The email containing a part of the display name, else the shortest one.
    pub fn preferred_email(&self) -> String {
        let parts: Vec<String> = self
            .name
            .split_whitespace()
            .filter(|p| p.chars().count() >= 3)
            .map(|p| p.to_lowercase())
            .collect();

        let mut emails: Vec<&String> = self.emails.iter().collect();
        emails.sort_by_key(|e| (e.len(), e.as_str()));

        emails
            .iter()
            .find(|e| {
                let lower = e.to_lowercase();
                parts.iter().any(|p| lower.contains(p.as_str()))
            })
            .or_else(|| emails.first())
            .map(|e| e.to_string())
            .unwrap_or_default()
    }

    /// Names other than the display name.
    pub fn aliases(&self) -> Vec<String> {
        self.names.iter().filter(|n| **n != self.name).cloned().collect()
    }
}

/// The authoritative person set of one repository run.
#[derive(Debug)]
pub struct PersonsDb {
    persons: Vec<Person>,
    parent: Vec<usize>,
    by_name: HashMap<String, PersonId>,
    by_email: HashMap<String, PersonId>,
    policy: IdentityPolicy,
    filters: Option<Filters>,
}

impl Default for PersonsDb {
    fn default() -> Self {
        Self::new(IdentityPolicy::default())
    }
}

impl PersonsDb {
    pub fn new(policy: IdentityPolicy) -> Self {
        Self {
            persons: Vec::new(),
            parent: Vec::new(),
            by_name: HashMap::new(),
            by_email: HashMap::new(),
            policy,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Record a (name, email) sighting and return the canonical person for it.
    pub fn register(&mut self, name: &str, email: &str) -> PersonId {
        let name = name.trim();
        let email = email.trim().trim_start_matches('<').trim_end_matches('>');
        if name.is_empty() && !email.is_empty() {
            warn!(email, "commit author has an email but no name");
        }

        let name_key = name.to_lowercase();
        let email_key = email.to_lowercase();

        let by_email = (!email_key.is_empty())
            .then(|| self.by_email.get(&email_key).copied())
            .flatten()
            .map(|id| self.resolve(id));
        let by_name = if name_key.is_empty() && !email_key.is_empty() {
            None
        } else {
            self.by_name
                .get(&name_key)
                .copied()
                .map(|id| self.resolve(id))
                .filter(|id| self.name_match_allowed(*id, &email_key))
        };

        let id = match (by_name, by_email) {
            (None, None) => self.create(name, email),
            (Some(id), None) | (None, Some(id)) => id,
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => self.union(a, b),
        };

        self.add_alias(id, name, email);
        if !name_key.is_empty() || email_key.is_empty() {
            self.by_name.insert(name_key, id);
        }
        if !email_key.is_empty() {
            self.by_email.insert(email_key, id);
        }
        id
    }

    /// Look up a sighting without recording it. Email wins over name.
    pub fn find(&self, name: &str, email: &str) -> Option<PersonId> {
        let email_key = email.trim().trim_start_matches('<').trim_end_matches('>').to_lowercase();
        let name_key = name.trim().to_lowercase();
        (!email_key.is_empty())
            .then(|| self.by_email.get(&email_key))
            .flatten()
            .or_else(|| self.by_name.get(&name_key))
            .map(|id| self.resolve(*id))
    }

    /// Canonical id after all merges so far.
    pub fn resolve(&self, id: PersonId) -> PersonId {
        let mut i = id.0;
        while self.parent[i] != i {
            i = self.parent[i];
        }
        PersonId(i)
    }

    pub fn get(&self, id: PersonId) -> &Person {
        &self.persons[self.resolve(id).0]
    }

    pub fn is_excluded(&self, id: PersonId) -> bool {
        self.get(id).excluded
    }

    /// Canonical persons in creation order.
    pub fn persons(&self) -> impl Iterator<Item = &Person> {
        self.persons
            .iter()
            .enumerate()
            .filter(|(i, _)| self.parent[*i] == *i)
            .map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.persons().count()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    fn name_match_allowed(&self, candidate: PersonId, email_key: &str) -> bool {
        match self.policy {
            IdentityPolicy::Loose => true,
            IdentityPolicy::EmailDomain => {
                let Some(domain) = email_domain(email_key) else {
                    return true;
                };
                let person = &self.persons[candidate.0];
                person.emails.is_empty()
                    || person
                        .emails
                        .iter()
                        .any(|e| email_domain(&e.to_lowercase()).as_deref() == Some(domain.as_str()))
            }
        }
    }

    fn create(&mut self, name: &str, email: &str) -> PersonId {
        let id = PersonId(self.persons.len());
        self.persons.push(Person::new(id, name, email));
        self.parent.push(id.0);
        debug!(name, email, id = id.0, "new person");
        id
    }

    /// Merge the later-created person into the earlier one.
    fn union(&mut self, a: PersonId, b: PersonId) -> PersonId {
        let (keep, drop) = if a.0 < b.0 { (a, b) } else { (b, a) };
        self.parent[drop.0] = keep.0;

        let merged = self.persons[drop.0].clone();
        let target = &mut self.persons[keep.0];
        target.names.extend(merged.names);
        target.emails.extend(merged.emails);
        target.excluded |= merged.excluded;
        debug!(keep = %target.name, drop = %merged.name, "merged persons");
        keep
    }

    fn add_alias(&mut self, id: PersonId, name: &str, email: &str) {
        let excluded = self
            .filters
            .as_ref()
            .map(|f| f.author_excluded(name) || f.email_excluded(email))
            .unwrap_or(false);

        let person = &mut self.persons[id.0];
        person.names.insert(name.to_string());
        if !email.is_empty() {
            person.emails.insert(email.to_string());
        }
        person.excluded |= excluded;
    }
}

fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_string())
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn same_pair_twice_is_one_person() {
        let mut db = PersonsDb::default();
        let a = db.register("Alice", "alice@example.com");
        let b = db.register("Alice", "alice@example.com");
        assert_eq!(a, b);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn shared_email_chain_merges_transitively() {
        let mut db = PersonsDb::default();
        db.register("A", "e1@x.org");
        db.register("B", "e1@x.org");
        let id = db.register("B", "e2@x.org");

        assert_eq!(db.len(), 1);
        let person = db.get(id);
        assert_eq!(person.names, set(&["A", "B"]));
        assert_eq!(person.emails, set(&["e1@x.org", "e2@x.org"]));
        assert_eq!(person.name, "A");
    }

    #[test]
    fn bridging_pair_merges_two_persons() {
        let mut db = PersonsDb::default();
        let a = db.register("Alice", "alice@home.net");
        let b = db.register("Ally", "ally@work.com");
        assert_ne!(db.resolve(a), db.resolve(b));

        let bridge = db.register("Alice", "ally@work.com");
        assert_eq!(db.resolve(a), db.resolve(b));
        assert_eq!(bridge, db.resolve(a));
        assert_eq!(db.get(b).name, "Alice");
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mut db = PersonsDb::default();
        let a = db.register("alice", "Alice@Example.com");
        let b = db.register("Someone Else", "alice@example.COM");
        assert_eq!(db.resolve(a), db.resolve(b));
        assert_eq!(db.get(a).name, "alice");
    }

    #[test]
    fn email_domain_policy_keeps_namesakes_apart() {
        let mut db = PersonsDb::new(IdentityPolicy::EmailDomain);
        let a = db.register("Sam", "sam@acme.com");
        let b = db.register("Sam", "sam@other.org");
        assert_ne!(db.resolve(a), db.resolve(b));

        let c = db.register("Sam", "s.smith@acme.com");
        assert_eq!(db.resolve(a), db.resolve(c));
    }

    #[test]
    fn loose_policy_merges_namesakes() {
        let mut db = PersonsDb::new(IdentityPolicy::Loose);
        let a = db.register("Sam", "sam@acme.com");
        let b = db.register("Sam", "sam@other.org");
        assert_eq!(db.resolve(a), db.resolve(b));
    }

    #[test]
    fn exclusion_spreads_through_merges() {
        let settings = Settings {
            ex_emails: vec!["*@bots.io".to_string()],
            ..Settings::default()
        };
        let mut db = PersonsDb::default().with_filters(settings.validate().unwrap());
        let human = db.register("Release Bot", "release@corp.com");
        assert!(!db.is_excluded(human));
        db.register("Release Bot", "ci@bots.io");
        assert!(db.is_excluded(human));
    }

    #[test]
    fn empty_email_matches_by_name_only() {
        let mut db = PersonsDb::default();
        let a = db.register("Bob", "");
        let b = db.register("Carol", "");
        let c = db.register("bob", "bob@example.com");
        assert_ne!(a, b);
        assert_eq!(db.resolve(a), db.resolve(c));
        assert_eq!(db.get(a).emails, set(&["bob@example.com"]));
    }

    #[test]
    fn find_does_not_register() {
        let mut db = PersonsDb::default();
        let a = db.register("Alice", "alice@x.org");
        assert_eq!(db.find("ALICE", "other@x.org"), Some(a));
        assert_eq!(db.find("Unknown", "alice@X.org"), Some(a));
        assert_eq!(db.find("Nobody", "nobody@x.org"), None);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn preferred_email_contains_name_part() {
        let mut db = PersonsDb::default();
        let id = db.register("Jane Doe", "jd@x.io");
        db.register("Jane Doe", "jane.doe@company.com");
        assert_eq!(db.get(id).preferred_email(), "jane.doe@company.com");
        assert!(db.get(id).aliases().is_empty());
    }
}
