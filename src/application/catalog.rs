use crate::domain::{CategoryPatch, NewCategory, ProductCategory};
use crate::infrastructure::{AccountRepository, CategoryRepository, RepositoryError};
use crate::ledger::derive_categories;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Category name is required")]
    NameRequired,
    #[error("Category is used by {in_use} account(s)")]
    InUse { in_use: i64 },
}

pub struct CatalogService<C, A>
where
    C: CategoryRepository,
    A: AccountRepository,
{
    category_repo: Arc<C>,
    account_repo: Arc<A>,
}

impl<C, A> CatalogService<C, A>
where
    C: CategoryRepository,
    A: AccountRepository,
{
    pub fn new(category_repo: Arc<C>, account_repo: Arc<A>) -> Self {
        Self {
            category_repo,
            account_repo,
        }
    }

    /// Stored categories. When the category table cannot be read the list is
    /// derived from the service types present on accounts instead.
    pub async fn list_categories(&self) -> Result<Vec<ProductCategory>, CatalogError> {
        match self.category_repo.list().await {
            Ok(categories) => Ok(categories),
            Err(e) => {
                warn!(error = %e, "Category list unavailable, deriving from accounts");
                let accounts = self.account_repo.list(None).await?;
                Ok(derive_categories(&accounts))
            }
        }
    }

    pub async fn get_category(&self, id: Uuid) -> Result<ProductCategory, CatalogError> {
        Ok(self.category_repo.get_by_id(id).await?)
    }

    pub async fn create_category(&self, input: NewCategory) -> Result<ProductCategory, CatalogError> {
        if input.name.trim().is_empty() {
            return Err(CatalogError::NameRequired);
        }

        let category = ProductCategory::new(NewCategory {
            name: input.name.trim().to_string(),
            ..input
        });
        self.category_repo.create(&category).await?;

        info!(category_id = %category.id, "Created category {}", category.name);
        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        patch: CategoryPatch,
    ) -> Result<ProductCategory, CatalogError> {
        if matches!(&patch.name, Some(name) if name.trim().is_empty()) {
            return Err(CatalogError::NameRequired);
        }

        let mut category = self.category_repo.get_by_id(id).await?;
        category.apply(patch);
        self.category_repo.update(&category).await?;

        info!(category_id = %id, "Updated category");
        Ok(category)
    }

    /// Refused while any account still references the category.
    pub async fn delete_category(&self, id: Uuid) -> Result<(), CatalogError> {
        let in_use = self.account_repo.count_by_category(id).await?;
        if in_use > 0 {
            warn!(category_id = %id, in_use, "Refusing to delete category in use");
            return Err(CatalogError::InUse { in_use });
        }

        self.category_repo.delete(id).await?;
        info!(category_id = %id, "Deleted category");
        Ok(())
    }
}
