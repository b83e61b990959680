use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user(&self, user_id: &str) -> RepoResult<Option<User>>;
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: User) -> RepoResult<()>;
    async fn update_user(&self, user: &User) -> RepoResult<()>;
    async fn set_user_token(&self, user_id: &str, token: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn create_product(&self, product: Product) -> RepoResult<Product>;
    async fn get_product(&self, id: &str) -> RepoResult<Product>;
    /// Newest first. Returns the requested page and the total record count.
    async fn list_products(&self, page: u64, limit: u64) -> RepoResult<(Vec<Product>, u64)>;
    async fn update_product(&self, product: Product) -> RepoResult<Product>;
    /// Returns the deleted record so callers can clean up its image file.
    async fn delete_product(&self, id: &str) -> RepoResult<Product>;
}

#[async_trait]
pub trait SlideRepo: Send + Sync {
    async fn list_slides(&self) -> RepoResult<Vec<Slide>>;
    async fn create_slide(&self, slide: Slide) -> RepoResult<Slide>;
    async fn get_slide(&self, id: &str) -> RepoResult<Slide>;
    async fn update_slide(&self, slide: Slide) -> RepoResult<Slide>;
    async fn delete_slide(&self, id: &str) -> RepoResult<Slide>;
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn create_payment(&self, record: PaymentRecord) -> RepoResult<()>;
    async fn find_payment(&self, digest: &str) -> RepoResult<Option<PaymentRecord>>;
}

pub trait Repo: UserRepo + ProductRepo + SlideRepo + PaymentRepo {}

impl<T> Repo for T where T: UserRepo + ProductRepo + SlideRepo + PaymentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        products: Vec<Product>,  // insertion order; listings walk it newest first
        slides: Vec<Slide>,
        payments: HashMap<String, PaymentRecord>,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("RAKSHOP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("RAKSHOP_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        eprintln!("[inmem] Loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        eprintln!("[inmem] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    eprintln!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    eprintln!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }
        async fn find_user(&self, user_id: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.get(user_id).cloned())
        }
        async fn create_user(&self, user: User) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == user.email) {
                return Err(RepoError::Conflict);
            }
            s.users.insert(user.user_id.clone(), user);
            drop(s);
            self.persist();
            Ok(())
        }
        async fn update_user(&self, user: &User) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let slot = s.users.get_mut(&user.user_id).ok_or(RepoError::NotFound)?;
            *slot = user.clone();
            drop(s);
            self.persist();
            Ok(())
        }
        async fn set_user_token(&self, user_id: &str, token: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(user_id).ok_or(RepoError::NotFound)?;
            user.token = Some(token.to_string());
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ProductRepo for InMemRepo {
        async fn create_product(&self, product: Product) -> RepoResult<Product> {
            let mut s = self.state.write().unwrap();
            s.products.push(product.clone());
            drop(s);
            self.persist();
            Ok(product)
        }
        async fn get_product(&self, id: &str) -> RepoResult<Product> {
            let s = self.state.read().unwrap();
            s.products.iter().find(|p| p.id == id).cloned().ok_or(RepoError::NotFound)
        }
        async fn list_products(&self, page: u64, limit: u64) -> RepoResult<(Vec<Product>, u64)> {
            let s = self.state.read().unwrap();
            let total = s.products.len() as u64;
            let skip = (page.saturating_sub(1) * limit) as usize;
            let items = s.products
                .iter()
                .rev()
                .skip(skip)
                .take(limit as usize)
                .cloned()
                .collect();
            Ok((items, total))
        }
        async fn update_product(&self, product: Product) -> RepoResult<Product> {
            let mut s = self.state.write().unwrap();
            let slot = s.products.iter_mut().find(|p| p.id == product.id).ok_or(RepoError::NotFound)?;
            *slot = product.clone();
            drop(s);
            self.persist();
            Ok(product)
        }
        async fn delete_product(&self, id: &str) -> RepoResult<Product> {
            let mut s = self.state.write().unwrap();
            let idx = s.products.iter().position(|p| p.id == id).ok_or(RepoError::NotFound)?;
            let removed = s.products.remove(idx);
            drop(s);
            self.persist();
            Ok(removed)
        }
    }

    #[async_trait]
    impl SlideRepo for InMemRepo {
        async fn list_slides(&self) -> RepoResult<Vec<Slide>> {
            let s = self.state.read().unwrap();
            Ok(s.slides.iter().rev().cloned().collect())
        }
        async fn create_slide(&self, slide: Slide) -> RepoResult<Slide> {
            let mut s = self.state.write().unwrap();
            s.slides.push(slide.clone());
            drop(s);
            self.persist();
            Ok(slide)
        }
        async fn get_slide(&self, id: &str) -> RepoResult<Slide> {
            let s = self.state.read().unwrap();
            s.slides.iter().find(|x| x.id == id).cloned().ok_or(RepoError::NotFound)
        }
        async fn update_slide(&self, slide: Slide) -> RepoResult<Slide> {
            let mut s = self.state.write().unwrap();
            let slot = s.slides.iter_mut().find(|x| x.id == slide.id).ok_or(RepoError::NotFound)?;
            *slot = slide.clone();
            drop(s);
            self.persist();
            Ok(slide)
        }
        async fn delete_slide(&self, id: &str) -> RepoResult<Slide> {
            let mut s = self.state.write().unwrap();
            let idx = s.slides.iter().position(|x| x.id == id).ok_or(RepoError::NotFound)?;
            let removed = s.slides.remove(idx);
            drop(s);
            self.persist();
            Ok(removed)
        }
    }

    #[async_trait]
    impl PaymentRepo for InMemRepo {
        async fn create_payment(&self, record: PaymentRecord) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.payments.insert(record.digest.clone(), record);
            drop(s);
            self.persist();
            Ok(())
        }
        async fn find_payment(&self, digest: &str) -> RepoResult<Option<PaymentRecord>> {
            let s = self.state.read().unwrap();
            Ok(s.payments.get(digest).cloned())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres, Row};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError { RepoError::Internal(e.to_string()) }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT user_id, name, email, password_hash, profile_image, token FROM users WHERE email = $1"
            )
            .bind(email)
            .fetch_optional(&self.pool).await.map_err(internal)
        }
        async fn find_user(&self, user_id: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT user_id, name, email, password_hash, profile_image, token FROM users WHERE user_id = $1"
            )
            .bind(user_id)
            .fetch_optional(&self.pool).await.map_err(internal)
        }
        async fn create_user(&self, user: User) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, name, email, password_hash, profile_image, token) VALUES ($1,$2,$3,$4,$5,$6)"
            )
            .bind(&user.user_id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.profile_image)
            .bind(&user.token)
            .execute(&self.pool).await
            .map_err(|_| RepoError::Conflict)?; // unique index on email
            Ok(())
        }
        async fn update_user(&self, user: &User) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE users SET name = $2, password_hash = $3, profile_image = $4, token = $5 WHERE user_id = $1"
            )
            .bind(&user.user_id)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(&user.profile_image)
            .bind(&user.token)
            .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
        async fn set_user_token(&self, user_id: &str, token: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE users SET token = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(token)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl ProductRepo for PgRepo {
        async fn create_product(&self, product: Product) -> RepoResult<Product> {
            sqlx::query(
                "INSERT INTO products (id, name, description, price, image) VALUES ($1,$2,$3,$4,$5)"
            )
            .bind(&product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(&product.image)
            .execute(&self.pool).await.map_err(internal)?;
            Ok(product)
        }
        async fn get_product(&self, id: &str) -> RepoResult<Product> {
            sqlx::query_as::<_, Product>(
                "SELECT id, name, description, price, image FROM products WHERE id = $1"
            )
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
        async fn list_products(&self, page: u64, limit: u64) -> RepoResult<(Vec<Product>, u64)> {
            let total: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM products")
                .fetch_one(&self.pool).await.map_err(internal)?
                .try_get("cnt").map_err(internal)?;
            let offset = page.saturating_sub(1) * limit;
            let items = sqlx::query_as::<_, Product>(
                "SELECT id, name, description, price, image FROM products ORDER BY seq DESC OFFSET $1 LIMIT $2"
            )
            .bind(offset as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool).await.map_err(internal)?;
            Ok((items, total as u64))
        }
        async fn update_product(&self, product: Product) -> RepoResult<Product> {
            let res = sqlx::query(
                "UPDATE products SET name = $2, description = $3, price = $4, image = $5 WHERE id = $1"
            )
            .bind(&product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(&product.image)
            .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(product)
        }
        async fn delete_product(&self, id: &str) -> RepoResult<Product> {
            sqlx::query_as::<_, Product>(
                "DELETE FROM products WHERE id = $1 RETURNING id, name, description, price, image"
            )
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl SlideRepo for PgRepo {
        async fn list_slides(&self) -> RepoResult<Vec<Slide>> {
            sqlx::query_as::<_, Slide>(
                "SELECT id, description, image FROM slideshows ORDER BY seq DESC"
            )
            .fetch_all(&self.pool).await.map_err(internal)
        }
        async fn create_slide(&self, slide: Slide) -> RepoResult<Slide> {
            sqlx::query("INSERT INTO slideshows (id, description, image) VALUES ($1,$2,$3)")
                .bind(&slide.id)
                .bind(&slide.description)
                .bind(&slide.image)
                .execute(&self.pool).await.map_err(internal)?;
            Ok(slide)
        }
        async fn get_slide(&self, id: &str) -> RepoResult<Slide> {
            sqlx::query_as::<_, Slide>(
                "SELECT id, description, image FROM slideshows WHERE id = $1"
            )
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
        async fn update_slide(&self, slide: Slide) -> RepoResult<Slide> {
            let res = sqlx::query("UPDATE slideshows SET description = $2, image = $3 WHERE id = $1")
                .bind(&slide.id)
                .bind(&slide.description)
                .bind(&slide.image)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(slide)
        }
        async fn delete_slide(&self, id: &str) -> RepoResult<Slide> {
            sqlx::query_as::<_, Slide>(
                "DELETE FROM slideshows WHERE id = $1 RETURNING id, description, image"
            )
            .bind(id)
            .fetch_optional(&self.pool).await.map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PaymentRepo for PgRepo {
        async fn create_payment(&self, record: PaymentRecord) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO payments (digest, payload, amount, created_at) VALUES ($1,$2,$3,$4) \
                 ON CONFLICT (digest) DO NOTHING"
            )
            .bind(&record.digest)
            .bind(&record.payload)
            .bind(record.amount)
            .bind(record.created_at)
            .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }
        async fn find_payment(&self, digest: &str) -> RepoResult<Option<PaymentRecord>> {
            sqlx::query_as::<_, PaymentRecord>(
                "SELECT digest, payload, amount, created_at FROM payments WHERE digest = $1"
            )
            .bind(digest)
            .fetch_optional(&self.pool).await.map_err(internal)
        }
    }
}
