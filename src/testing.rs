//! In-memory backends for service and route tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::auth::jwt::JwtKeys;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, PendingOtp, ProfileChanges, Role, User, UserRelations};
use crate::chat::ChatClient;
use crate::config::{
    AppConfig, ChatConfig, JwtConfig, MailConfig, MailTransport, StorageConfig,
};
use crate::mail::testing::RecordingMailer;
use crate::recipes::repo::RecipeStore;
use crate::recipes::repo_types::{
    Comment, LeaderboardEntry, LikeState, NewComment, NewRecipe, Recipe, RecipeChanges,
    RecipeFilter, Status,
};
use crate::refs::{self, RecordRef};
use crate::state::AppState;
use crate::storage::testing::FakeStorage;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    recipes: Vec<Recipe>,
    comments: Vec<(Uuid, Comment)>,
    saved: Vec<(Uuid, Uuid)>,
    purchased: Vec<(Uuid, Uuid)>,
    clock: Option<OffsetDateTime>,
}

impl Inner {
    /// Strictly increasing timestamps so ordering by creation is deterministic.
    fn tick(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let t = match self.clock {
            Some(last) if last >= now => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(t);
        t
    }

    fn recipe_exists(&self, id: Uuid) -> bool {
        self.recipes.iter().any(|r| r.id == id)
    }

    fn drop_recipe(&mut self, id: Uuid) {
        self.recipes.retain(|r| r.id != id);
        self.comments.retain(|(recipe_id, _)| *recipe_id != id);
        self.saved.retain(|(_, recipe_id)| *recipe_id != id);
        self.purchased.retain(|(_, recipe_id)| *recipe_id != id);
    }
}

/// Both store traits over plain vectors, with the same cascade rules as the schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    pub fail_comment_renames: AtomicBool,
    /// Makes the next email lookup miss, as if another request had not committed yet.
    pub miss_next_email_lookup: AtomicBool,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        if self.miss_next_email_lookup.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let now = inner.tick();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            bio: String::new(),
            profile_picture: String::new(),
            is_verified: false,
            pending_otp: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(user.clone());
        Ok(Some(user))
    }

    async fn set_otp(&self, user_id: Uuid, otp: &PendingOtp) -> anyhow::Result<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == user_id) {
            u.pending_otp = Some(otp.clone());
        }
        Ok(())
    }

    async fn consume_otp(
        &self,
        email: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Uuid>> {
        let mut inner = self.lock();
        let Some(user) = inner.users.iter_mut().find(|u| {
            u.email == email
                && u
                    .pending_otp
                    .as_ref()
                    .is_some_and(|p| p.code == code && p.is_live_at(now))
        }) else {
            return Ok(None);
        };
        user.is_verified = true;
        user.pending_otp = None;
        Ok(Some(user.id))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let mut inner = self.lock();
        let now = inner.tick();
        let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            user.name = name.clone();
        }
        if let Some(bio) = &changes.bio {
            user.bio = bio.clone();
        }
        if let Some(picture) = &changes.profile_picture {
            user.profile_picture = picture.clone();
        }
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn relations(&self, user_id: Uuid) -> anyhow::Result<UserRelations> {
        let inner = self.lock();
        let of = |rows: &[(Uuid, Uuid)]| -> Vec<RecordRef> {
            rows.iter()
                .filter(|(u, _)| *u == user_id)
                .map(|(_, r)| RecordRef::from(*r))
                .collect()
        };
        Ok(UserRelations {
            saved_recipes: of(&inner.saved),
            purchased_recipes: of(&inner.purchased),
            ..Default::default()
        })
    }

    async fn toggle_saved(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        let before = inner.saved.len();
        inner.saved.retain(|row| *row != (user_id, recipe_id));
        if inner.saved.len() < before {
            return Ok(false);
        }
        inner.saved.push((user_id, recipe_id));
        Ok(true)
    }

    async fn add_purchase(&self, user_id: Uuid, recipe_id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        if inner.purchased.contains(&(user_id, recipe_id)) {
            return Ok(false);
        }
        inner.purchased.push((user_id, recipe_id));
        Ok(true)
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let mut users = self.lock().users.clone();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn delete_user(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        let before = inner.users.len();
        inner.users.retain(|u| u.id != id);
        if inner.users.len() == before {
            return Ok(false);
        }
        let owned: Vec<Uuid> = inner
            .recipes
            .iter()
            .filter(|r| r.owner_id() == id)
            .map(|r| r.id)
            .collect();
        for recipe_id in owned {
            inner.drop_recipe(recipe_id);
        }
        inner.comments.retain(|(_, c)| !c.author.refers_to(id));
        inner.saved.retain(|(u, _)| *u != id);
        inner.purchased.retain(|(u, _)| *u != id);
        for recipe in inner.recipes.iter_mut() {
            recipe.likes.retain(|l| !l.refers_to(id));
            recipe.likes_count = recipe.likes.len();
        }
        Ok(true)
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn insert_recipe(&self, new: NewRecipe) -> anyhow::Result<Recipe> {
        let mut inner = self.lock();
        let now = inner.tick();
        let recipe = Recipe {
            id: Uuid::new_v4(),
            title: new.title,
            category: new.category,
            image: new.image,
            ingredients: new.ingredients,
            steps: new.steps,
            difficulty: new.difficulty,
            cooking_time: new.cooking_time,
            owner: RecordRef::from(new.owner_id),
            chef_name: new.chef_name,
            status: Status::Pending,
            is_premium: new.is_premium,
            price: new.price,
            likes: Vec::new(),
            likes_count: 0,
            created_at: now,
            updated_at: now,
        };
        inner.recipes.push(recipe.clone());
        Ok(recipe)
    }

    async fn find_recipe(&self, id: Uuid) -> anyhow::Result<Option<Recipe>> {
        Ok(self.lock().recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn recipe_comments(&self, id: Uuid) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .lock()
            .comments
            .iter()
            .filter(|(recipe_id, _)| *recipe_id == id)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn list_recipes(&self, filter: RecipeFilter) -> anyhow::Result<Vec<Recipe>> {
        let inner = self.lock();
        if let RecipeFilter::SavedBy(user_id) = filter {
            return Ok(inner
                .saved
                .iter()
                .filter(|(u, _)| *u == user_id)
                .filter_map(|(_, r)| inner.recipes.iter().find(|x| x.id == *r).cloned())
                .collect());
        }
        let mut out: Vec<Recipe> = inner
            .recipes
            .iter()
            .filter(|r| match filter {
                RecipeFilter::Approved => r.status == Status::Approved,
                RecipeFilter::OwnedBy(owner) => r.owner_id() == owner,
                _ => true,
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_recipe(
        &self,
        id: Uuid,
        changes: &RecipeChanges,
    ) -> anyhow::Result<Option<Recipe>> {
        let mut inner = self.lock();
        let now = inner.tick();
        let Some(r) = inner.recipes.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        let c = changes.clone();
        r.title = c.title.unwrap_or(r.title.clone());
        r.category = c.category.unwrap_or(r.category);
        r.image = c.image.or(r.image.take());
        r.ingredients = c.ingredients.unwrap_or(r.ingredients.clone());
        r.steps = c.steps.unwrap_or(r.steps.clone());
        r.difficulty = c.difficulty.unwrap_or(r.difficulty);
        r.cooking_time = c.cooking_time.unwrap_or(r.cooking_time.clone());
        r.is_premium = c.is_premium.unwrap_or(r.is_premium);
        r.price = c.price.unwrap_or(r.price);
        r.status = Status::Pending;
        r.updated_at = now;
        Ok(Some(r.clone()))
    }

    async fn set_status(&self, id: Uuid, status: Status) -> anyhow::Result<Option<Recipe>> {
        let mut inner = self.lock();
        let now = inner.tick();
        Ok(inner.recipes.iter_mut().find(|r| r.id == id).map(|r| {
            r.status = status;
            r.updated_at = now;
            r.clone()
        }))
    }

    async fn delete_recipe(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        if !inner.recipe_exists(id) {
            return Ok(false);
        }
        inner.drop_recipe(id);
        Ok(true)
    }

    async fn toggle_like(
        &self,
        recipe_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<LikeState>> {
        let mut inner = self.lock();
        let Some(r) = inner.recipes.iter_mut().find(|r| r.id == recipe_id) else {
            return Ok(None);
        };
        let is_liked = if refs::contains(&r.likes, user_id) {
            r.likes.retain(|l| !l.refers_to(user_id));
            false
        } else {
            r.likes.push(RecordRef::from(user_id));
            true
        };
        r.likes_count = r.likes.len();
        Ok(Some(LikeState {
            is_liked,
            likes_count: r.likes_count as i64,
        }))
    }

    async fn add_comment(
        &self,
        recipe_id: Uuid,
        comment: NewComment,
    ) -> anyhow::Result<Option<Vec<Comment>>> {
        let mut inner = self.lock();
        if !inner.recipe_exists(recipe_id) {
            return Ok(None);
        }
        let created_at = inner.tick();
        inner.comments.push((
            recipe_id,
            Comment {
                id: Uuid::new_v4(),
                author: RecordRef::from(comment.author_id),
                author_name: comment.author_name,
                text: comment.text,
                created_at,
            },
        ));
        Ok(Some(
            inner
                .comments
                .iter()
                .filter(|(r, _)| *r == recipe_id)
                .map(|(_, c)| c.clone())
                .collect(),
        ))
    }

    async fn leaderboard(&self, limit: i64) -> anyhow::Result<Vec<LeaderboardEntry>> {
        let mut approved: Vec<Recipe> = self
            .lock()
            .recipes
            .iter()
            .filter(|r| r.status == Status::Approved)
            .cloned()
            .collect();
        approved.sort_by(|a, b| {
            b.likes_count
                .cmp(&a.likes_count)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(approved
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|r| LeaderboardEntry {
                id: r.id,
                title: r.title,
                chef_name: r.chef_name,
                likes_count: r.likes_count as i64,
                category: r.category.as_str().to_string(),
            })
            .collect())
    }

    async fn rename_chef(&self, owner_id: Uuid, name: &str) -> anyhow::Result<u64> {
        let mut n = 0;
        for r in self.lock().recipes.iter_mut().filter(|r| r.owner_id() == owner_id) {
            if r.chef_name != name {
                r.chef_name = name.to_string();
                n += 1;
            }
        }
        Ok(n)
    }

    async fn rename_comment_author(&self, author_id: Uuid, name: &str) -> anyhow::Result<u64> {
        if self.fail_comment_renames.load(Ordering::SeqCst) {
            anyhow::bail!("comment store unavailable");
        }
        let mut n = 0;
        for (_, c) in self.lock().comments.iter_mut() {
            if c.author.refers_to(author_id) && c.author_name != name {
                c.author_name = name.to_string();
                n += 1;
            }
        }
        Ok(n)
    }
}

/// Handles on the fakes behind a test `AppState`.
pub struct Fakes {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub storage: Arc<FakeStorage>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        database_max_connections: 1,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_days: 30,
        },
        cookie_secure: false,
        allow_admin_signup: false,
        mail: MailConfig {
            transport: MailTransport::Log,
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            sender: "noreply@cookmate.dev".into(),
            from_name: "CookMate".into(),
            timeout_secs: 1,
        },
        storage: StorageConfig {
            endpoint: "http://127.0.0.1:9".into(),
            bucket: "fake".into(),
            access_key: "fake".into(),
            secret_key: "fake".into(),
            region: "us-east-1".into(),
            public_url: "https://fake.local".into(),
        },
        chat: ChatConfig {
            url: "http://127.0.0.1:9/api/chat".into(),
            model: "llama3".into(),
            timeout_secs: 1,
        },
    }
}

pub fn fake_state() -> (AppState, Fakes) {
    let config = test_config();
    let store = Arc::new(MemoryStore::default());
    let mailer = Arc::new(RecordingMailer::default());
    let storage = Arc::new(FakeStorage::default());
    let chat = ChatClient::new(&config.chat).unwrap();

    let state = AppState {
        config: Arc::new(config),
        users: store.clone(),
        recipes: store.clone(),
        mailer: mailer.clone(),
        storage: storage.clone(),
        chat,
    };
    (state, Fakes { store, mailer, storage })
}

pub async fn seed_user(st: &AppState, name: &str, role: Role) -> CurrentUser {
    let user = st
        .users
        .insert_user(NewUser {
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "unused".into(),
            role,
        })
        .await
        .unwrap()
        .unwrap();
    CurrentUser::from(user)
}

/// Seeds a user and signs a bearer token for them.
pub async fn seed_session(st: &AppState, name: &str, role: Role) -> (CurrentUser, String) {
    let user = seed_user(st, name, role).await;
    let token = JwtKeys::new(&st.config.jwt).sign(user.id).unwrap();
    (user, token)
}

pub async fn set_status(st: &AppState, recipe_id: Uuid, status: Status) {
    st.recipes.set_status(recipe_id, status).await.unwrap().unwrap();
}
