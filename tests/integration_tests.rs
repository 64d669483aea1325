//! Integration tests for slot-ledger services over in-memory repositories:
//! slot allocation through sales, category protection, invoicing and the
//! dashboard fallback path.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use slot_ledger::{
    application::{
        AccountError, AccountService, CatalogError, CatalogService, DashboardService, InvoiceError,
        InvoiceRequest, InvoiceService, InvoiceSettings, SalesError, SalesService,
    },
    domain::{
        Account, AccountPatch, CustomerContact, CustomerType, Invoice, InvoiceStatus, NewAccount,
        NewCategory, OrderItem, PaymentMethod, PrimaryHolder, ProductCategory, RenewalStatus, Sale,
        SaleDraft, SalePatch, SaleStatus, ServiceType, SubscriptionType,
    },
    infrastructure::{
        AccountRepository, CategoryRepository, InvoiceRepository, MetricsRepository,
        RepositoryError, SaleRepository,
    },
    ledger::{recompute, DashboardMetrics, InvoiceDerivationError, SlotError, TermAuthority},
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

// ============================================================================
// Mock Repositories for Testing
// ============================================================================

/// In-memory mock implementation of AccountRepository
#[derive(Clone, Default)]
struct MockAccountRepository {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
    /// Accounts whose conditional slot update is refused, as if another
    /// order took the last slot first.
    refuse_allocation: Arc<Mutex<HashSet<Uuid>>>,
    /// Accounts whose slot release fails, as if the database went away.
    fail_release: Arc<Mutex<HashSet<Uuid>>>,
}

impl MockAccountRepository {
    fn stored(&self, id: Uuid) -> Account {
        self.accounts.lock().unwrap().get(&id).cloned().unwrap()
    }

    fn refuse(&self, id: Uuid) {
        self.refuse_allocation.lock().unwrap().insert(id);
    }

    fn break_release(&self, id: Uuid) {
        self.fail_release.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&account.id) {
            return Err(RepositoryError::Conflict("Account already exists".to_string()));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn list(&self, category_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        let mut result: Vec<Account> = accounts
            .values()
            .filter(|a| category_id.is_none() || a.category_id == category_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn update(&self, account: &Account) -> Result<Account, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let stored = accounts
            .get_mut(&account.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", account.id)))?;

        if account.max_user_slots < stored.current_users {
            return Err(RepositoryError::Conflict(format!(
                "cannot reduce slots below current users ({})",
                stored.current_users
            )));
        }

        let current_users = stored.current_users;
        *stored = account.clone();
        stored.current_users = current_users;
        recompute(stored);
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn allocate_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError> {
        let refused = self.refuse_allocation.lock().unwrap().contains(&id);
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;

        if refused || account.current_users + count > account.max_user_slots {
            return Err(RepositoryError::Conflict(format!(
                "{} has {} available slots, {} requested",
                account.display_name(),
                account.available_slots,
                count
            )));
        }

        account.current_users += count;
        recompute(account);
        Ok(account.clone())
    }

    async fn release_slots(&self, id: Uuid, count: i32) -> Result<Account, RepositoryError> {
        if self.fail_release.lock().unwrap().contains(&id) {
            return Err(RepositoryError::InvalidData("connection reset".to_string()));
        }
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;

        account.current_users = (account.current_users - count).max(0);
        recompute(account);
        Ok(account.clone())
    }

    async fn count_by_category(&self, category_id: Uuid) -> Result<i64, RepositoryError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .values()
            .filter(|a| a.category_id == Some(category_id))
            .count() as i64)
    }
}

/// In-memory mock implementation of CategoryRepository
#[derive(Clone, Default)]
struct MockCategoryRepository {
    categories: Arc<Mutex<HashMap<Uuid, ProductCategory>>>,
    unavailable: bool,
}

#[async_trait]
impl CategoryRepository for MockCategoryRepository {
    async fn create(&self, category: &ProductCategory) -> Result<(), RepositoryError> {
        self.categories
            .lock()
            .unwrap()
            .insert(category.id, category.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<ProductCategory, RepositoryError> {
        self.categories
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Category {}", id)))
    }

    async fn list(&self) -> Result<Vec<ProductCategory>, RepositoryError> {
        if self.unavailable {
            return Err(RepositoryError::InvalidData("category table missing".to_string()));
        }
        let mut result: Vec<ProductCategory> =
            self.categories.lock().unwrap().values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn update(&self, category: &ProductCategory) -> Result<(), RepositoryError> {
        let mut categories = self.categories.lock().unwrap();
        match categories.get_mut(&category.id) {
            Some(stored) => {
                *stored = category.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Category {}", category.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.categories
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Category {}", id)))
    }
}

/// In-memory mock implementation of SaleRepository
#[derive(Clone, Default)]
struct MockSaleRepository {
    sales: Arc<Mutex<HashMap<String, Sale>>>,
}

impl MockSaleRepository {
    fn count(&self) -> usize {
        self.sales.lock().unwrap().len()
    }
}

#[async_trait]
impl SaleRepository for MockSaleRepository {
    async fn create(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let mut sales = self.sales.lock().unwrap();
        if sales.contains_key(&sale.order_number) {
            return Err(RepositoryError::Conflict(format!(
                "Order {} already exists",
                sale.order_number
            )));
        }
        sales.insert(sale.order_number.clone(), sale.clone());
        Ok(())
    }

    async fn get_by_order_number(&self, order_number: &str) -> Result<Sale, RepositoryError> {
        self.sales
            .lock()
            .unwrap()
            .get(order_number)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Sale {}", order_number)))
    }

    async fn list(&self) -> Result<Vec<Sale>, RepositoryError> {
        let mut result: Vec<Sale> = self.sales.lock().unwrap().values().cloned().collect();
        result.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(result)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Sale>, RepositoryError> {
        let mut result = self.list().await?;
        result.truncate(limit.max(0) as usize);
        Ok(result)
    }

    async fn update(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let mut sales = self.sales.lock().unwrap();
        match sales.get_mut(&sale.order_number) {
            Some(stored) => {
                *stored = sale.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("Sale {}", sale.order_number))),
        }
    }

    async fn delete(&self, order_number: &str) -> Result<(), RepositoryError> {
        self.sales
            .lock()
            .unwrap()
            .remove(order_number)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("Sale {}", order_number)))
    }
}

/// In-memory mock implementation of InvoiceRepository
#[derive(Clone, Default)]
struct MockInvoiceRepository {
    invoices: Arc<Mutex<HashMap<String, Invoice>>>,
    sequences: Arc<Mutex<HashMap<(String, String), i64>>>,
}

#[async_trait]
impl InvoiceRepository for MockInvoiceRepository {
    async fn create(&self, invoice: &Invoice) -> Result<(), RepositoryError> {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.invoice_number.clone(), invoice.clone());
        Ok(())
    }

    async fn get_by_number(&self, invoice_number: &str) -> Result<Invoice, RepositoryError> {
        self.invoices
            .lock()
            .unwrap()
            .get(invoice_number)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Invoice {}", invoice_number)))
    }

    async fn list(&self) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(self.invoices.lock().unwrap().values().cloned().collect())
    }

    async fn update_status(
        &self,
        invoice_number: &str,
        status: InvoiceStatus,
    ) -> Result<(), RepositoryError> {
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .get_mut(invoice_number)
            .ok_or_else(|| RepositoryError::NotFound(format!("Invoice {}", invoice_number)))?;
        invoice.status = status;
        Ok(())
    }

    async fn next_sequence(&self, prefix: &str, period: &str) -> Result<i64, RepositoryError> {
        let mut sequences = self.sequences.lock().unwrap();
        let value = sequences
            .entry((prefix.to_string(), period.to_string()))
            .or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

/// Metrics source whose aggregate query always fails.
struct UnavailableMetrics;

#[async_trait]
impl MetricsRepository for UnavailableMetrics {
    async fn load_metrics(&self, _now: DateTime<Utc>) -> Result<DashboardMetrics, RepositoryError> {
        Err(RepositoryError::InvalidData("aggregate view missing".to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn new_account(product_name: &str, max_user_slots: i32) -> NewAccount {
    NewAccount {
        product_name: product_name.to_string(),
        label: "Family 1".to_string(),
        email: "owner@example.com".to_string(),
        primary_holder: PrimaryHolder {
            name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
            phone: None,
        },
        max_user_slots,
        is_active: true,
        renewal_status: RenewalStatus::Renewable,
        renewal_date: Some(Utc::now() + Duration::days(20)),
        subscription_type: SubscriptionType::Monthly,
        cost: Decimal::from(150),
        is_shared_account: true,
        family_features: vec![],
        usage_restrictions: vec![],
        cost_per_additional_user: None,
        category_id: None,
        service_type: ServiceType::Streaming,
        brand: None,
    }
}

fn item(account: &Account, unit_price: i64, quantity: i32) -> OrderItem {
    OrderItem {
        account_id: account.id,
        product_name: account.product_name.clone(),
        unit_price: Decimal::from(unit_price),
        quantity,
    }
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

fn draft(items: Vec<OrderItem>, discount_rate: i64) -> SaleDraft {
    SaleDraft {
        category_id: Some(Uuid::new_v4()),
        items,
        customer: CustomerContact {
            customer_id: None,
            name: "Dina".to_string(),
            email: "dina@example.com".to_string(),
            phone: "+62 812 5555 0101".to_string(),
        },
        customer_type: CustomerType::Standard,
        discount_rate: Decimal::from(discount_rate),
        payment_method: PaymentMethod::BankTransfer,
        status: SaleStatus::Completed,
        start_date: start(),
        end_date: None,
        duration_days: None,
        notes: None,
    }
}

struct Ledger {
    account_repo: Arc<MockAccountRepository>,
    sale_repo: Arc<MockSaleRepository>,
    accounts: AccountService<MockAccountRepository>,
    sales: SalesService<MockSaleRepository, MockAccountRepository>,
}

fn ledger() -> Ledger {
    let account_repo = Arc::new(MockAccountRepository::default());
    let sale_repo = Arc::new(MockSaleRepository::default());
    Ledger {
        accounts: AccountService::new(account_repo.clone()),
        sales: SalesService::new(sale_repo.clone(), account_repo.clone()),
        account_repo,
        sale_repo,
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_slot_reduction_below_usage_is_rejected() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix Premium", 5))
        .await
        .expect("Failed to create account");
    assert_eq!(account.current_users, 0);
    assert_eq!(account.available_slots, 5);

    ledger
        .account_repo
        .allocate_slots(account.id, 3)
        .await
        .expect("Failed to allocate");
    assert_eq!(ledger.account_repo.stored(account.id).available_slots, 2);

    let patch = AccountPatch {
        max_user_slots: Some(2),
        label: Some("Renamed".to_string()),
        ..Default::default()
    };
    let err = ledger
        .accounts
        .update_account(account.id, patch, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccountError::Slots(SlotError::ReductionBelowUsage { current_users: 3 })
    ));
    assert!(err.to_string().contains('3'));

    let untouched = ledger.account_repo.stored(account.id);
    assert_eq!(untouched.max_user_slots, 5);
    assert_eq!(untouched.label, "Family 1");

    let patch = AccountPatch {
        max_user_slots: Some(4),
        ..Default::default()
    };
    let updated = assert_ok!(ledger.accounts.update_account(account.id, patch, Utc::now()).await);
    assert_eq!(updated.max_user_slots, 4);
    assert_eq!(updated.current_users, 3);
    assert_eq!(updated.available_slots, 1);
    assert_eq!(updated.days_until_renewal, Some(20));
}

#[tokio::test]
async fn test_account_creation_validates_input() {
    let ledger = ledger();

    let mut input = new_account("Spotify", 6);
    input.label = String::new();
    input.renewal_date = None;
    let err = assert_err!(ledger.accounts.create_account(input).await);
    match err {
        AccountError::Validation(errors) => {
            let fields = errors.field_errors();
            assert!(fields.contains_key("label"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let mut input = new_account("Spotify", 6);
    input.renewal_status = RenewalStatus::NonRenewable;
    input.renewal_date = None;
    assert_ok!(ledger.accounts.create_account(input).await);
}

#[tokio::test]
async fn test_account_edit_is_held_to_creation_rules() {
    let ledger = ledger();
    let mut input = new_account("Spotify Family", 6);
    input.renewal_status = RenewalStatus::NonRenewable;
    input.renewal_date = None;
    let account = ledger.accounts.create_account(input).await.unwrap();

    let patch = AccountPatch {
        renewal_status: Some(RenewalStatus::Renewable),
        cost: Some(Decimal::from(-50)),
        email: Some("not-an-email".to_string()),
        ..Default::default()
    };
    let err = assert_err!(ledger.accounts.update_account(account.id, patch, Utc::now()).await);
    match err {
        AccountError::Validation(errors) => {
            let fields = errors.field_errors();
            assert!(fields.contains_key("cost"));
            assert!(fields.contains_key("email"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let patch = AccountPatch {
        renewal_status: Some(RenewalStatus::Renewable),
        ..Default::default()
    };
    let err = assert_err!(ledger.accounts.update_account(account.id, patch, Utc::now()).await);
    assert!(matches!(err, AccountError::Validation(_)));

    let untouched = ledger.account_repo.stored(account.id);
    assert_eq!(untouched.renewal_status, RenewalStatus::NonRenewable);
    assert_eq!(untouched.cost, Decimal::from(150));
    assert_eq!(untouched.email, "owner@example.com");

    let patch = AccountPatch {
        renewal_status: Some(RenewalStatus::Renewable),
        renewal_date: Some(Utc::now() + Duration::days(10)),
        ..Default::default()
    };
    let updated = assert_ok!(ledger.accounts.update_account(account.id, patch, Utc::now()).await);
    assert_eq!(updated.renewal_status, RenewalStatus::Renewable);
    assert_eq!(updated.days_until_renewal, Some(10));
}

// ============================================================================
// Sales and slots
// ============================================================================

#[tokio::test]
async fn test_sale_allocates_slots_and_prices_the_order() {
    let ledger = ledger();
    let netflix = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();
    let disney = ledger
        .accounts
        .create_account(new_account("Disney+", 4))
        .await
        .unwrap();

    let sale = ledger
        .sales
        .create_sale(
            draft(vec![item(&netflix, 1000, 2), item(&disney, 500, 1)], 10),
            Utc::now(),
        )
        .await
        .expect("Failed to create sale");

    assert!(sale.order_number.starts_with("ORD-"));
    assert_eq!(sale.subtotal, Decimal::from(2500));
    assert_eq!(sale.discount_amount, Decimal::from(250));
    assert_eq!(sale.total, Decimal::from(2250));
    assert_eq!(sale.end_date, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    assert_eq!(sale.days_until_renewal, 30);

    let netflix = ledger.account_repo.stored(netflix.id);
    assert_eq!(netflix.current_users, 2);
    assert_eq!(netflix.available_slots, 3);
    let disney = ledger.account_repo.stored(disney.id);
    assert_eq!(disney.current_users, 1);
    assert_eq!(disney.available_slots, 3);
}

#[tokio::test]
async fn test_quick_duration_sets_the_term() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Canva Pro", 10))
        .await
        .unwrap();

    let mut input = draft(vec![item(&account, 100, 1)], 0);
    input.duration_days = Some(90);
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(sale.end_date, start() + Duration::days(90));
    assert_eq!(sale.days_until_renewal, 90);

    let mut input = draft(vec![item(&account, 100, 1)], 0);
    input.duration_days = Some(90);
    input.end_date = NaiveDate::from_ymd_opt(2025, 2, 15);
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(sale.days_until_renewal, 45);
}

#[tokio::test]
async fn test_out_of_range_duration_is_rejected() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Canva Pro", 10))
        .await
        .unwrap();

    let mut input = draft(vec![item(&account, 100, 1)], 0);
    input.duration_days = Some(2_000_000_000);
    let err = assert_err!(ledger.sales.create_sale(input, Utc::now()).await);
    match err {
        SalesError::Validation(errors) => {
            assert!(errors.field_errors().contains_key("duration_days"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(ledger.sale_repo.count(), 0);

    let sale = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 1)], 0), Utc::now())
        .await
        .unwrap();
    let patch = SalePatch {
        duration_days: Some(2_000_000_000),
        ..Default::default()
    };
    let err = assert_err!(ledger.sales.update_sale(&sale.order_number, patch, Utc::now()).await);
    assert!(matches!(err, SalesError::Validation(_)));
    let stored = ledger.sales.get_sale(&sale.order_number).await.unwrap();
    assert_eq!(stored.end_date, sale.end_date);
}

#[tokio::test]
async fn test_term_authority_survives_persistence() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Disney+", 4))
        .await
        .unwrap();

    let mut input = draft(vec![item(&account, 100, 1)], 0);
    input.duration_days = Some(30);
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(sale.term_authority, TermAuthority::Duration);

    let move_start = |day| SalePatch {
        start_date: NaiveDate::from_ymd_opt(2025, 1, day),
        ..Default::default()
    };
    let moved = ledger
        .sales
        .update_sale(&sale.order_number, move_start(11), Utc::now())
        .await
        .unwrap();
    assert_eq!(moved.end_date, NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
    assert_eq!(moved.days_until_renewal, 30);

    let pinned = SalePatch {
        end_date: NaiveDate::from_ymd_opt(2025, 3, 1),
        ..Default::default()
    };
    let pinned = ledger
        .sales
        .update_sale(&sale.order_number, pinned, Utc::now())
        .await
        .unwrap();
    assert_eq!(pinned.term_authority, TermAuthority::EndDate);
    assert_eq!(pinned.days_until_renewal, 49);

    let moved = ledger
        .sales
        .update_sale(&sale.order_number, move_start(21), Utc::now())
        .await
        .unwrap();
    assert_eq!(moved.end_date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    assert_eq!(moved.days_until_renewal, 39);

    let stored = ledger.sales.get_sale(&sale.order_number).await.unwrap();
    assert_eq!(stored.term_authority, TermAuthority::EndDate);
}

#[tokio::test]
async fn test_reseller_gets_default_discount() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("YouTube Premium", 5))
        .await
        .unwrap();

    let mut input = draft(vec![item(&account, 100, 3)], 0);
    input.customer_type = CustomerType::Reseller;
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(sale.discount_rate, Decimal::from(10));
    assert_eq!(sale.total, Decimal::from(270));

    let mut input = draft(vec![item(&account, 100, 1)], 25);
    input.customer_type = CustomerType::Reseller;
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(sale.discount_rate, Decimal::from(25));
}

#[tokio::test]
async fn test_sale_beyond_available_slots_is_rejected() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("HBO Max", 1))
        .await
        .unwrap();

    let err = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 2)], 0), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SalesError::Slots(SlotError::Insufficient { .. })));
    assert_eq!(ledger.sale_repo.count(), 0);
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 0);
}

#[tokio::test]
async fn test_inactive_account_cannot_be_sold() {
    let ledger = ledger();
    let mut input = new_account("Prime Video", 4);
    input.is_active = false;
    let account = ledger.accounts.create_account(input).await.unwrap();

    let err = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 1)], 0), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SalesError::InactiveAccount(_)));
    assert_eq!(ledger.sale_repo.count(), 0);
}

#[tokio::test]
async fn test_failed_allocation_rolls_back_taken_slots() {
    let ledger = ledger();
    let first = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();
    let second = ledger
        .accounts
        .create_account(new_account("Spotify", 5))
        .await
        .unwrap();
    ledger.account_repo.refuse(first.id.max(second.id));

    let err = ledger
        .sales
        .create_sale(
            draft(vec![item(&first, 100, 2), item(&second, 100, 2)], 0),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SalesError::Repository(RepositoryError::Conflict(_))));

    assert_eq!(ledger.account_repo.stored(first.id).current_users, 0);
    assert_eq!(ledger.account_repo.stored(second.id).current_users, 0);
    assert_eq!(ledger.sale_repo.count(), 0);
}

#[tokio::test]
async fn test_cancel_reinstate_and_delete_move_slots() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();
    let sale = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 2)], 0), Utc::now())
        .await
        .unwrap();
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 2);

    let cancel = SalePatch {
        status: Some(SaleStatus::Cancelled),
        ..Default::default()
    };
    let cancelled = ledger
        .sales
        .update_sale(&sale.order_number, cancel, Utc::now())
        .await
        .unwrap();
    assert_eq!(cancelled.status, SaleStatus::Cancelled);
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 0);

    let reinstate = SalePatch {
        status: Some(SaleStatus::Completed),
        duration_days: Some(60),
        ..Default::default()
    };
    let reinstated = ledger
        .sales
        .update_sale(&sale.order_number, reinstate, Utc::now())
        .await
        .unwrap();
    assert_eq!(reinstated.days_until_renewal, 60);
    assert_eq!(reinstated.end_date, start() + Duration::days(60));
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 2);

    assert_ok!(ledger.sales.delete_sale(&sale.order_number).await);
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 0);
    assert_eq!(ledger.sale_repo.count(), 0);

    let err = assert_err!(ledger.sales.delete_sale(&sale.order_number).await);
    assert!(matches!(err, SalesError::Repository(RepositoryError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_release_restores_released_slots() {
    let ledger = ledger();
    let first = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();
    let second = ledger
        .accounts
        .create_account(new_account("Spotify", 5))
        .await
        .unwrap();
    let sale = ledger
        .sales
        .create_sale(
            draft(vec![item(&first, 100, 2), item(&second, 100, 3)], 0),
            Utc::now(),
        )
        .await
        .unwrap();
    ledger.account_repo.break_release(first.id.max(second.id));

    let err = assert_err!(ledger.sales.delete_sale(&sale.order_number).await);
    assert!(matches!(err, SalesError::Repository(RepositoryError::InvalidData(_))));
    assert_eq!(ledger.account_repo.stored(first.id).current_users, 2);
    assert_eq!(ledger.account_repo.stored(second.id).current_users, 3);
    assert_eq!(ledger.sale_repo.count(), 1);

    let cancel = SalePatch {
        status: Some(SaleStatus::Cancelled),
        ..Default::default()
    };
    assert_err!(ledger.sales.update_sale(&sale.order_number, cancel, Utc::now()).await);
    assert_eq!(ledger.account_repo.stored(first.id).current_users, 2);
    assert_eq!(ledger.account_repo.stored(second.id).current_users, 3);
    let stored = ledger.sales.get_sale(&sale.order_number).await.unwrap();
    assert_eq!(stored.status, SaleStatus::Completed);
}

#[tokio::test]
async fn test_deleting_cancelled_sale_leaves_slots_alone() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();

    let mut input = draft(vec![item(&account, 100, 2)], 0);
    input.status = SaleStatus::Cancelled;
    let cancelled = ledger.sales.create_sale(input, Utc::now()).await.unwrap();
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 0);

    let held = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 1)], 0), Utc::now())
        .await
        .unwrap();
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 1);

    ledger.sales.delete_sale(&cancelled.order_number).await.unwrap();
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 1);

    ledger.sales.delete_sale(&held.order_number).await.unwrap();
    assert_eq!(ledger.account_repo.stored(account.id).current_users, 0);
}

#[tokio::test]
async fn test_customers_are_aggregated_across_orders() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 10))
        .await
        .unwrap();

    ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 1)], 0), Utc::now())
        .await
        .unwrap();
    let mut second = draft(vec![item(&account, 200, 1)], 0);
    second.customer.email = "DINA@example.com".to_string();
    ledger
        .sales
        .create_sale(second, Utc::now() + Duration::seconds(1))
        .await
        .unwrap();

    let customers = ledger.sales.list_customers().await.unwrap();
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].total_orders, 2);
    assert_eq!(customers[0].total_spent, Decimal::from(300));
}

// ============================================================================
// Categories
// ============================================================================

#[tokio::test]
async fn test_category_in_use_cannot_be_deleted() {
    let account_repo = Arc::new(MockAccountRepository::default());
    let category_repo = Arc::new(MockCategoryRepository::default());
    let catalog = CatalogService::new(category_repo.clone(), account_repo.clone());
    let accounts = AccountService::new(account_repo.clone());

    let category = catalog
        .create_category(NewCategory {
            name: "Streaming".to_string(),
            description: String::new(),
            icon: "tv".to_string(),
            color: "#e50914".to_string(),
            service_types: vec![],
        })
        .await
        .expect("Failed to create category");
    assert_eq!(category.service_types, vec!["other".to_string()]);

    let mut input = new_account("Netflix", 5);
    input.category_id = Some(category.id);
    let account = accounts.create_account(input).await.unwrap();

    let err = assert_err!(catalog.delete_category(category.id).await);
    assert!(matches!(err, CatalogError::InUse { in_use: 1 }));
    assert!(err.to_string().contains('1'));

    accounts.delete_account(account.id).await.unwrap();
    assert_ok!(catalog.delete_category(category.id).await);
}

#[tokio::test]
async fn test_category_name_is_required() {
    let account_repo = Arc::new(MockAccountRepository::default());
    let category_repo = Arc::new(MockCategoryRepository::default());
    let catalog = CatalogService::new(category_repo, account_repo);

    let err = catalog
        .create_category(NewCategory {
            name: "   ".to_string(),
            description: String::new(),
            icon: String::new(),
            color: String::new(),
            service_types: vec!["music".to_string()],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::NameRequired));
}

#[tokio::test]
async fn test_categories_fall_back_to_account_service_types() {
    let account_repo = Arc::new(MockAccountRepository::default());
    let category_repo = Arc::new(MockCategoryRepository {
        unavailable: true,
        ..Default::default()
    });
    let catalog = CatalogService::new(category_repo, account_repo.clone());
    let accounts = AccountService::new(account_repo);

    accounts.create_account(new_account("Netflix", 5)).await.unwrap();
    let mut music = new_account("Spotify", 6);
    music.service_type = ServiceType::Music;
    accounts.create_account(music).await.unwrap();

    let categories = catalog.list_categories().await.unwrap();
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Music", "Streaming"]);
    assert!(categories.iter().all(|c| c.id.is_nil()));
}

// ============================================================================
// Invoices
// ============================================================================

fn invoicing(
    sale_repo: Arc<MockSaleRepository>,
) -> InvoiceService<MockInvoiceRepository, MockSaleRepository> {
    InvoiceService::new(
        Arc::new(MockInvoiceRepository::default()),
        sale_repo,
        InvoiceSettings {
            prefix: "INV".to_string(),
            default_tax_rate: Decimal::ZERO,
            due_days: 14,
        },
    )
}

#[tokio::test]
async fn test_invoice_numbering_and_totals() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 10))
        .await
        .unwrap();
    let sale = ledger
        .sales
        .create_sale(draft(vec![item(&account, 1000, 2)], 0), Utc::now())
        .await
        .unwrap();
    let invoices = invoicing(ledger.sale_repo.clone());

    let now = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
    let request = InvoiceRequest {
        order_number: sale.order_number.clone(),
        tax_rate: Some(Decimal::from(10)),
        ..Default::default()
    };
    let first = invoices.create_invoice(request, now).await.unwrap();
    assert_eq!(first.invoice_number, "INV-202503-0001");
    assert_eq!(first.status, InvoiceStatus::Draft);
    assert_eq!(first.subtotal, Decimal::from(2000));
    assert_eq!(first.discount_amount, Decimal::ZERO);
    assert_eq!(first.tax_amount, Decimal::from(200));
    assert_eq!(first.total_amount, Decimal::from(2200));
    assert_eq!(first.due_date, now + Duration::days(14));
    assert_eq!(first.payment_terms, "Net 14");

    let request = InvoiceRequest {
        order_number: sale.order_number.clone(),
        ..Default::default()
    };
    let second = invoices.create_invoice(request, now).await.unwrap();
    assert_eq!(second.invoice_number, "INV-202503-0002");
    assert_eq!(second.total_amount, Decimal::from(2000));
}

#[tokio::test]
async fn test_reseller_invoice_applies_line_discounts() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Canva Pro", 10))
        .await
        .unwrap();
    let mut input = draft(vec![item(&account, 100, 3)], 20);
    input.customer_type = CustomerType::Reseller;
    input.customer.customer_id = Some("R-7".to_string());
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();

    let invoices = invoicing(ledger.sale_repo.clone());
    let invoice = invoices
        .create_invoice(
            InvoiceRequest {
                order_number: sale.order_number,
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(invoice.items[0].line_total, Decimal::from(240));
    assert_eq!(invoice.discount_amount, Decimal::from(60));
    assert_eq!(
        invoice.total_amount,
        invoice.subtotal - invoice.discount_amount + invoice.tax_amount
    );
    let reseller = invoice.customer_info.reseller_info.unwrap();
    assert_eq!(reseller.reseller_id, "R-7");
}

#[tokio::test]
async fn test_invoice_status_transitions() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 10))
        .await
        .unwrap();
    let sale = ledger
        .sales
        .create_sale(draft(vec![item(&account, 100, 1)], 0), Utc::now())
        .await
        .unwrap();
    let invoices = invoicing(ledger.sale_repo.clone());
    let invoice = invoices
        .create_invoice(
            InvoiceRequest {
                order_number: sale.order_number,
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    let number = invoice.invoice_number.as_str();

    let err = assert_err!(invoices.update_status(number, InvoiceStatus::Paid).await);
    assert!(matches!(
        err,
        InvoiceError::InvalidTransition {
            from: InvoiceStatus::Draft,
            to: InvoiceStatus::Paid
        }
    ));

    let sent = assert_ok!(invoices.update_status(number, InvoiceStatus::Sent).await);
    assert_eq!(sent.total_amount, invoice.total_amount);
    assert_ok!(invoices.update_status(number, InvoiceStatus::Overdue).await);
    assert_ok!(invoices.update_status(number, InvoiceStatus::Paid).await);
    assert_err!(invoices.update_status(number, InvoiceStatus::Cancelled).await);

    let stored = invoices.get_invoice(number).await.unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert!(!stored.is_overdue(Utc::now() + Duration::days(365)));
}

#[tokio::test]
async fn test_cancelled_sale_cannot_be_invoiced() {
    let ledger = ledger();
    let account = ledger
        .accounts
        .create_account(new_account("Netflix", 10))
        .await
        .unwrap();
    let mut input = draft(vec![item(&account, 100, 1)], 0);
    input.status = SaleStatus::Cancelled;
    let sale = ledger.sales.create_sale(input, Utc::now()).await.unwrap();

    let invoices = invoicing(ledger.sale_repo.clone());
    let err = invoices
        .create_invoice(
            InvoiceRequest {
                order_number: sale.order_number,
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InvoiceError::Derivation(InvoiceDerivationError::CancelledSale(_))
    ));
}

// ============================================================================
// Dashboard
// ============================================================================

#[tokio::test]
async fn test_dashboard_metrics_fall_back_to_local_computation() {
    let ledger = ledger();
    let netflix = ledger
        .accounts
        .create_account(new_account("Netflix", 5))
        .await
        .unwrap();
    let mut soon = new_account("Spotify", 5);
    soon.renewal_date = Some(Utc::now() + Duration::days(3));
    ledger.accounts.create_account(soon).await.unwrap();

    ledger
        .sales
        .create_sale(draft(vec![item(&netflix, 1000, 3)], 10), Utc::now())
        .await
        .unwrap();

    let dashboard = DashboardService::new(
        ledger.account_repo.clone(),
        ledger.sale_repo.clone(),
        Arc::new(UnavailableMetrics),
    );
    let metrics = dashboard.metrics(Utc::now()).await.unwrap();

    assert!(!metrics.from_aggregate);
    assert_eq!(metrics.total_accounts, 2);
    assert_eq!(metrics.total_slots, 10);
    assert_eq!(metrics.used_slots, 3);
    assert_eq!(metrics.available_slots, 7);
    assert_eq!(metrics.slot_utilization_pct, Decimal::from(30));
    assert_eq!(metrics.total_sales, 1);
    assert_eq!(metrics.total_revenue, Decimal::from(2700));
    assert_eq!(metrics.expiring_soon, 1);

    let expiring = dashboard.expiring(7, Utc::now()).await.unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].product_name, "Spotify");
    assert_eq!(expiring[0].days_until_renewal, Some(3));

    let recent = dashboard.recent_sales(5).await.unwrap();
    assert_eq!(recent.len(), 1);
}
