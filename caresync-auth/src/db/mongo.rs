use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Bson},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};
use uuid::Uuid;

use super::CredentialStore;
use crate::models::{Account, HardwareCredential, RefreshTokenRecord};

/// MongoDB-backed credential store. Refresh-token records are embedded in
/// the account document, so rotation and lockout updates are single-document
/// operations and therefore atomic.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            db: client.database(database),
        })
    }

    pub fn database(&self) -> Database {
        self.db.clone()
    }

    fn accounts(&self) -> Collection<Account> {
        self.db.collection("accounts")
    }

    fn credentials(&self) -> Collection<HardwareCredential> {
        self.db.collection("credentials")
    }

    /// Create the unique indexes the store contract relies on.
    pub async fn initialize_indexes(&self) -> Result<(), anyhow::Error> {
        let unique = IndexOptions::builder().unique(true).build();

        self.accounts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "tenant_id": 1, "email": 1 })
                    .options(unique.clone())
                    .build(),
                None,
            )
            .await?;

        self.credentials()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "credential_id": 1 })
                    .options(unique)
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn find_account_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        let account = self
            .accounts()
            .find_one(
                doc! { "tenant_id": tenant_id.to_string(), "email": email },
                None,
            )
            .await?;
        Ok(account)
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error> {
        let account = self
            .accounts()
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(account)
    }

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error> {
        self.accounts().insert_one(account, None).await?;
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        account_id: Uuid,
        record: RefreshTokenRecord,
    ) -> Result<(), anyhow::Error> {
        // Expired records are inert; prune them before appending. RFC 3339
        // strings with a fixed offset compare lexicographically.
        let now = to_bson(&Utc::now())?;
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$pull": { "refresh_tokens": { "expires_at": { "$lt": now } } } },
                None,
            )
            .await?;

        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$push": { "refresh_tokens": to_bson(&record)? } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn take_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<(Account, RefreshTokenRecord)>, anyhow::Error> {
        // Single find-and-modify: only one concurrent caller can match the
        // filter before the $pull removes the record.
        let account = self
            .accounts()
            .find_one_and_update(
                doc! { "refresh_tokens.token_hash": token_hash },
                doc! { "$pull": { "refresh_tokens": { "token_hash": token_hash } } },
                None,
            )
            .await?;

        Ok(account.and_then(|account| {
            let record = account
                .refresh_tokens
                .iter()
                .find(|r| r.token_hash == token_hash)
                .cloned();
            record.map(|record| (account, record))
        }))
    }

    async fn remove_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, anyhow::Error> {
        let result = self
            .accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$pull": { "refresh_tokens": { "token_hash": token_hash } } },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn clear_refresh_family(
        &self,
        account_id: Uuid,
        family: Uuid,
    ) -> Result<(), anyhow::Error> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$pull": { "refresh_tokens": { "family": family.to_string() } } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn clear_all_refresh_tokens(&self, account_id: Uuid) -> Result<(), anyhow::Error> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$set": { "refresh_tokens": Bson::Array(vec![]) } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn increment_failed_logins(&self, account_id: Uuid) -> Result<u32, anyhow::Error> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let account = self
            .accounts()
            .find_one_and_update(
                doc! { "_id": account_id.to_string() },
                doc! { "$inc": { "failed_login_attempts": 1 } },
                options,
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("Account not found: {}", account_id))?;

        Ok(account.failed_login_attempts)
    }

    async fn set_lockout(
        &self,
        account_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$set": { "lockout_until": to_bson(&until)? } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn reset_lockout(&self, account_id: Uuid) -> Result<(), anyhow::Error> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$set": { "failed_login_attempts": 0, "lockout_until": Bson::Null } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), anyhow::Error> {
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$set": {
                    "password_hash": password_hash,
                    "updated_at": to_bson(&Utc::now())?,
                } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn set_mfa(
        &self,
        account_id: Uuid,
        secret: Option<String>,
        enabled: bool,
    ) -> Result<(), anyhow::Error> {
        let secret = match secret {
            Some(s) => Bson::String(s),
            None => Bson::Null,
        };
        self.accounts()
            .update_one(
                doc! { "_id": account_id.to_string() },
                doc! { "$set": {
                    "mfa_secret": secret,
                    "mfa_enabled": enabled,
                    "updated_at": to_bson(&Utc::now())?,
                } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn add_credential(&self, credential: &HardwareCredential) -> Result<(), anyhow::Error> {
        self.credentials().insert_one(credential, None).await?;
        Ok(())
    }

    async fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<HardwareCredential>, anyhow::Error> {
        let credential = self
            .credentials()
            .find_one(doc! { "credential_id": credential_id }, None)
            .await?;
        Ok(credential)
    }

    async fn credentials_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<HardwareCredential>, anyhow::Error> {
        let cursor = self
            .credentials()
            .find(doc! { "account_id": account_id.to_string() }, None)
            .await?;
        let credentials = cursor.try_collect().await?;
        Ok(credentials)
    }

    async fn update_sign_counter(
        &self,
        credential_id: &str,
        sign_counter: u32,
    ) -> Result<(), anyhow::Error> {
        self.credentials()
            .update_one(
                doc! { "credential_id": credential_id },
                doc! { "$set": { "sign_counter": sign_counter } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}
