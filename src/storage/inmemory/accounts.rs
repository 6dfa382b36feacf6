//! In-memory account storage implementation
//!
//! Users, roles and claims live in mutex-guarded maps keyed by auto-incremented IDs.
//! Role and user claims are stored as claim IDs and resolved on read.

use crate::auth::types::*;
use crate::errors::StorageError;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone)]
struct StoredRole {
    id: u64,
    name: String,
    is_default: bool,
    claim_ids: Vec<u64>,
}

/// In-memory implementation for account and credential storage
#[derive(Default)]
pub struct MemoryAuthStorage {
    users: Mutex<HashMap<u64, User>>,
    user_claims: Mutex<HashMap<u64, Vec<u64>>>,
    roles: Mutex<HashMap<u64, StoredRole>>,
    claims: Mutex<HashMap<u64, Claim>>,
    pub(super) refresh_tokens: Mutex<HashMap<u64, RefreshTokenRecord>>,
    pub(super) reset_tokens: Mutex<HashMap<u64, PasswordResetToken>>,
    user_ids: AtomicU64,
    role_ids: AtomicU64,
    claim_ids: AtomicU64,
    pub(super) refresh_token_ids: AtomicU64,
    pub(super) reset_token_ids: AtomicU64,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::LockFailed(e.to_string()))
}

pub(super) fn next_id(sequence: &AtomicU64) -> u64 {
    sequence.fetch_add(1, Ordering::SeqCst) + 1
}

impl MemoryAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding the `user` (default) and `admin` roles, where `admin`
    /// carries the claim that allows assigning claims.
    pub fn seeded() -> Result<Self> {
        let storage = Self::new();
        let set_claims = storage.insert_claim(CLAIM_SET_USER_CLAIMS)?;
        storage.insert_role("user", true, &[])?;
        storage.insert_role("admin", false, &[set_claims.id])?;
        Ok(storage)
    }

    /// Add a claim; names are unique
    pub fn insert_claim(&self, name: &str) -> Result<Claim> {
        let mut claims = lock(&self.claims)?;
        if claims.values().any(|claim| claim.name == name) {
            return Err(StorageError::Conflict("name".to_string()));
        }
        let claim = Claim {
            id: next_id(&self.claim_ids),
            name: name.to_string(),
        };
        claims.insert(claim.id, claim.clone());
        Ok(claim)
    }

    /// Add a role granting the listed claims; names are unique
    pub fn insert_role(&self, name: &str, is_default: bool, claim_ids: &[u64]) -> Result<Role> {
        let role = {
            let mut roles = lock(&self.roles)?;
            if roles.values().any(|role| role.name == name) {
                return Err(StorageError::Conflict("name".to_string()));
            }
            let role = StoredRole {
                id: next_id(&self.role_ids),
                name: name.to_string(),
                is_default,
                claim_ids: claim_ids.to_vec(),
            };
            roles.insert(role.id, role.clone());
            role
        };
        self.resolve_role(role)
    }

    fn resolve_claims(&self, ids: &[u64]) -> Result<Vec<Claim>> {
        let claims = lock(&self.claims)?;
        Ok(ids.iter().filter_map(|id| claims.get(id).cloned()).collect())
    }

    fn resolve_role(&self, role: StoredRole) -> Result<Role> {
        Ok(Role {
            claims: self.resolve_claims(&role.claim_ids)?,
            id: role.id,
            name: role.name,
            is_default: role.is_default,
        })
    }

    fn resolve_user(&self, mut user: User) -> Result<User> {
        let claim_ids = lock(&self.user_claims)?
            .get(&user.id)
            .cloned()
            .unwrap_or_default();
        user.claims = self.resolve_claims(&claim_ids)?;
        Ok(user)
    }

    fn find_user<F>(&self, predicate: F) -> Result<Option<User>>
    where
        F: Fn(&User) -> bool,
    {
        let found = {
            let users = lock(&self.users)?;
            let mut matches: Vec<&User> = users.values().filter(|user| predicate(user)).collect();
            matches.sort_by_key(|user| user.id);
            matches.first().map(|user| (*user).clone())
        };
        found.map(|user| self.resolve_user(user)).transpose()
    }
}

/// Column of the first uniqueness violation `candidate` would cause
fn conflicting_column(users: &HashMap<u64, User>, candidate: &User) -> Option<&'static str> {
    let others = || users.values().filter(|user| user.id != candidate.id);
    if others().any(|user| user.username == candidate.username) {
        return Some("username");
    }
    if others().any(|user| user.email == candidate.email) {
        return Some("email");
    }
    if candidate.is_linked()
        && others().any(|user| user.external_id.as_deref() == candidate.external_id.as_deref())
    {
        return Some("external_id");
    }
    None
}

#[async_trait]
impl UserStore for MemoryAuthStorage {
    async fn get_user(&self, id: u64) -> Result<Option<User>> {
        self.find_user(|user| user.id == id)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_user(|user| user.username == username)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_user(|user| user.email == email)
    }

    async fn find_user_by_external_id_or_email(
        &self,
        external_id: &str,
        email: &str,
    ) -> Result<Option<User>> {
        if !external_id.is_empty() {
            let linked = self.find_user(|user| user.external_id.as_deref() == Some(external_id))?;
            if linked.is_some() {
                return Ok(linked);
            }
        }
        self.find_user(|user| user.email == email)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut users = lock(&self.users)?;
        let now = Utc::now();
        let mut user = User {
            id: 0,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role_id: new_user.role_id,
            claims: Vec::new(),
            external_provider: new_user.external_provider,
            external_id: new_user.external_id,
            profile_image: new_user.profile_image,
            created_at: now,
            updated_at: now,
        };
        if let Some(column) = conflicting_column(&users, &user) {
            return Err(StorageError::Conflict(column.to_string()));
        }
        user.id = next_id(&self.user_ids);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = lock(&self.users)?;
        if !users.contains_key(&user.id) {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        if let Some(column) = conflicting_column(&users, user) {
            return Err(StorageError::Conflict(column.to_string()));
        }
        let mut stored = user.clone();
        stored.claims = Vec::new();
        stored.updated_at = Utc::now();
        users.insert(stored.id, stored);
        Ok(())
    }

    async fn set_user_claims(&self, user_id: u64, claim_ids: &[u64]) -> Result<()> {
        if !lock(&self.users)?.contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("user {}", user_id)));
        }
        let known: Vec<u64> = {
            let claims = lock(&self.claims)?;
            claim_ids
                .iter()
                .copied()
                .filter(|id| claims.contains_key(id))
                .collect()
        };
        lock(&self.user_claims)?.insert(user_id, known);
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryAuthStorage {
    async fn get_default_role(&self) -> Result<Option<Role>> {
        let role = {
            let roles = lock(&self.roles)?;
            let mut defaults: Vec<&StoredRole> =
                roles.values().filter(|role| role.is_default).collect();
            defaults.sort_by_key(|role| role.id);
            defaults.first().map(|role| (*role).clone())
        };
        role.map(|role| self.resolve_role(role)).transpose()
    }

    async fn get_role(&self, id: u64) -> Result<Option<Role>> {
        let role = lock(&self.roles)?.get(&id).cloned();
        role.map(|role| self.resolve_role(role)).transpose()
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let role = lock(&self.roles)?
            .values()
            .find(|role| role.name == name)
            .cloned();
        role.map(|role| self.resolve_role(role)).transpose()
    }
}

#[async_trait]
impl ClaimStore for MemoryAuthStorage {
    async fn find_claims_by_ids(&self, ids: &[u64]) -> Result<Vec<Claim>> {
        self.resolve_claims(ids)
    }
}

impl AuthStorage for MemoryAuthStorage {}
