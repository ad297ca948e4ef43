use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_core::{Aggregate, AggregateRoot, DomainError, ProductId};
use equiplend_events::Event;

/// Availability status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    OutOfStock,
    /// Withdrawn from lending; cannot be reserved regardless of stock.
    Inactive,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "ACTIVE",
            ProductStatus::OutOfStock => "OUT_OF_STOCK",
            ProductStatus::Inactive => "INACTIVE",
        }
    }

    fn derive(active: bool, stock: i64) -> Self {
        match (active, stock) {
            (false, _) => ProductStatus::Inactive,
            (true, 0) => ProductStatus::OutOfStock,
            (true, _) => ProductStatus::Active,
        }
    }
}

impl core::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ProductStatus::Active),
            "OUT_OF_STOCK" => Ok(ProductStatus::OutOfStock),
            "INACTIVE" => Ok(ProductStatus::Inactive),
            other => Err(DomainError::validation(format!("unknown product status '{other}'"))),
        }
    }
}

/// Aggregate root: Product (one lendable inventory line).
///
/// # Invariants
/// - `stock` is never negative.
/// - `status` is `OutOfStock` exactly when `stock == 0` (unless `Inactive`).
/// - An inactive product cannot be decremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    stock: i64,
    min_stock: i64,
    active: bool,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            stock: 0,
            min_stock: 0,
            active: true,
            status: ProductStatus::OutOfStock,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a product from persisted state.
    pub fn restore(
        id: ProductId,
        name: String,
        stock: i64,
        min_stock: i64,
        active: bool,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            stock,
            min_stock,
            active,
            status: ProductStatus::derive(active, stock),
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    /// `CheckAvailable`: true iff current stock covers `quantity`.
    pub fn is_available(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }

    /// True when stock sits at or below the minimum-stock threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProduct {
    pub product_id: ProductId,
    pub name: String,
    pub initial_stock: i64,
    pub min_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecrementStock (reservation on approval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecrementStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IncrementStock (restock / release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetProductActive (withdraw from / return to lending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProductActive {
    pub product_id: ProductId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    RegisterProduct(RegisterProduct),
    DecrementStock(DecrementStock),
    IncrementStock(IncrementStock),
    SetActive(SetProductActive),
}

impl ProductCommand {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductCommand::RegisterProduct(c) => c.product_id,
            ProductCommand::DecrementStock(c) => c.product_id,
            ProductCommand::IncrementStock(c) => c.product_id,
            ProductCommand::SetActive(c) => c.product_id,
        }
    }
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub name: String,
    pub initial_stock: i64,
    pub min_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockDecremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDecremented {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Stock left after the decrement.
    pub remaining: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockIncremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIncremented {
    pub product_id: ProductId,
    pub quantity: i64,
    pub remaining: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockReached (signal only; does not change state beyond the version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockReached {
    pub product_id: ProductId,
    pub stock: i64,
    pub min_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductActivationChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivationChanged {
    pub product_id: ProductId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    StockDecremented(StockDecremented),
    StockIncremented(StockIncremented),
    LowStockReached(LowStockReached),
    ActivationChanged(ProductActivationChanged),
}

impl ProductEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductRegistered(e) => e.product_id,
            ProductEvent::StockDecremented(e) => e.product_id,
            ProductEvent::StockIncremented(e) => e.product_id,
            ProductEvent::LowStockReached(e) => e.product_id,
            ProductEvent::ActivationChanged(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "inventory.product.registered",
            ProductEvent::StockDecremented(_) => "inventory.product.stock_decremented",
            ProductEvent::StockIncremented(_) => "inventory.product.stock_incremented",
            ProductEvent::LowStockReached(_) => "inventory.product.low_stock",
            ProductEvent::ActivationChanged(_) => "inventory.product.activation_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::StockDecremented(e) => e.occurred_at,
            ProductEvent::StockIncremented(e) => e.occurred_at,
            ProductEvent::LowStockReached(e) => e.occurred_at,
            ProductEvent::ActivationChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductRegistered(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.stock = e.initial_stock;
                self.min_stock = e.min_stock;
                self.created = true;
            }
            ProductEvent::StockDecremented(e) => {
                self.stock -= e.quantity;
            }
            ProductEvent::StockIncremented(e) => {
                self.stock += e.quantity;
            }
            ProductEvent::LowStockReached(_) => {}
            ProductEvent::ActivationChanged(e) => {
                self.active = e.active;
            }
        }

        self.status = ProductStatus::derive(self.active, self.stock);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::RegisterProduct(cmd) => self.handle_register(cmd),
            ProductCommand::DecrementStock(cmd) => self.handle_decrement(cmd),
            ProductCommand::IncrementStock(cmd) => self.handle_increment(cmd),
            ProductCommand::SetActive(cmd) => self.handle_set_active(cmd),
        }
    }
}

impl Product {
    fn ensure_registered(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("product {product_id}")));
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if cmd.min_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }

        Ok(vec![ProductEvent::ProductRegistered(ProductRegistered {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            initial_stock: cmd.initial_stock,
            min_stock: cmd.min_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decrement(&self, cmd: &DecrementStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_registered(cmd.product_id)?;

        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if !self.active {
            return Err(DomainError::validation(format!(
                "product {} is inactive",
                self.id
            )));
        }
        if !self.is_available(cmd.quantity) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                requested: cmd.quantity,
                available: self.stock,
            });
        }

        let remaining = self.stock - cmd.quantity;
        let mut events = vec![ProductEvent::StockDecremented(StockDecremented {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            remaining,
            occurred_at: cmd.occurred_at,
        })];

        if remaining <= self.min_stock {
            events.push(ProductEvent::LowStockReached(LowStockReached {
                product_id: cmd.product_id,
                stock: remaining,
                min_stock: self.min_stock,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_increment(&self, cmd: &IncrementStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_registered(cmd.product_id)?;

        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        let remaining = self
            .stock
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("stock overflow"))?;

        Ok(vec![ProductEvent::StockIncremented(StockIncremented {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            remaining,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetProductActive) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_registered(cmd.product_id)?;

        if self.active == cmd.active {
            return Ok(Vec::new());
        }
        Ok(vec![ProductEvent::ActivationChanged(ProductActivationChanged {
            product_id: cmd.product_id,
            active: cmd.active,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(stock: i64, min_stock: i64) -> Product {
        let product_id = ProductId::new();
        let mut product = Product::empty(product_id);
        product
            .execute(&ProductCommand::RegisterProduct(RegisterProduct {
                product_id,
                name: "Projector".to_string(),
                initial_stock: stock,
                min_stock,
                occurred_at: test_time(),
            }))
            .unwrap();
        product
    }

    fn decrement(product: &Product, quantity: i64) -> ProductCommand {
        ProductCommand::DecrementStock(DecrementStock {
            product_id: product.id_typed(),
            quantity,
            occurred_at: test_time(),
        })
    }

    fn increment(product: &Product, quantity: i64) -> ProductCommand {
        ProductCommand::IncrementStock(IncrementStock {
            product_id: product.id_typed(),
            quantity,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn register_sets_status_from_initial_stock() {
        assert_eq!(registered(5, 1).status(), ProductStatus::Active);
        assert_eq!(registered(0, 1).status(), ProductStatus::OutOfStock);
    }

    #[test]
    fn register_rejects_blank_name_and_negative_numbers() {
        let product_id = ProductId::new();
        let product = Product::empty(product_id);
        let mut cmd = RegisterProduct {
            product_id,
            name: "  ".to_string(),
            initial_stock: 1,
            min_stock: 0,
            occurred_at: test_time(),
        };
        assert!(matches!(
            product.handle(&ProductCommand::RegisterProduct(cmd.clone())),
            Err(DomainError::Validation(_))
        ));

        cmd.name = "Tripod".to_string();
        cmd.initial_stock = -1;
        assert!(matches!(
            product.handle(&ProductCommand::RegisterProduct(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn check_available_compares_against_stock() {
        let product = registered(5, 0);
        assert!(product.is_available(5));
        assert!(!product.is_available(6));
    }

    #[test]
    fn decrement_reduces_stock() {
        let mut product = registered(5, 0);
        let cmd = decrement(&product, 3);
        product.execute(&cmd).unwrap();
        assert_eq!(product.stock(), 2);
        assert_eq!(product.status(), ProductStatus::Active);
    }

    #[test]
    fn decrement_beyond_stock_is_insufficient_and_leaves_state() {
        let product = registered(2, 0);
        let before = product.clone();

        let err = product.handle(&decrement(&product, 3)).unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: product.id_typed(),
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(product, before);
    }

    #[test]
    fn decrement_to_zero_flips_out_of_stock() {
        let mut product = registered(3, 0);
        let cmd = decrement(&product, 3);
        product.execute(&cmd).unwrap();
        assert_eq!(product.stock(), 0);
        assert_eq!(product.status(), ProductStatus::OutOfStock);
    }

    #[test]
    fn decrement_at_or_below_threshold_signals_low_stock() {
        let product = registered(10, 4);

        let events = product.handle(&decrement(&product, 5)).unwrap();
        assert_eq!(events.len(), 1);

        let events = product.handle(&decrement(&product, 6)).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            ProductEvent::LowStockReached(e) => {
                assert_eq!(e.stock, 4);
                assert_eq!(e.min_stock, 4);
            }
            other => panic!("expected LowStockReached, got {other:?}"),
        }
    }

    #[test]
    fn increment_clears_out_of_stock() {
        let mut product = registered(1, 0);
        let cmd = decrement(&product, 1);
        product.execute(&cmd).unwrap();
        assert_eq!(product.status(), ProductStatus::OutOfStock);

        let cmd = increment(&product, 4);
        product.execute(&cmd).unwrap();
        assert_eq!(product.stock(), 4);
        assert_eq!(product.status(), ProductStatus::Active);
    }

    #[test]
    fn zero_quantities_are_rejected() {
        let product = registered(5, 0);
        assert!(matches!(
            product.handle(&decrement(&product, 0)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            product.handle(&increment(&product, 0)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn unregistered_product_is_not_found() {
        let product = Product::empty(ProductId::new());
        assert!(matches!(
            product.handle(&decrement(&product, 1)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn restore_derives_status() {
        let product = Product::restore(ProductId::new(), "Mic".to_string(), 0, 2, true, 7);
        assert_eq!(product.status(), ProductStatus::OutOfStock);
        assert_eq!(product.version(), 7);
        assert!(product.is_registered());

        let withdrawn = Product::restore(ProductId::new(), "Mic".to_string(), 4, 2, false, 1);
        assert_eq!(withdrawn.status(), ProductStatus::Inactive);
    }

    #[test]
    fn inactive_products_cannot_be_reserved_but_can_be_restocked() {
        let mut product = registered(5, 0);
        let cmd = ProductCommand::SetActive(SetProductActive {
            product_id: product.id_typed(),
            active: false,
            occurred_at: test_time(),
        });
        product.execute(&cmd).unwrap();
        assert_eq!(product.status(), ProductStatus::Inactive);

        assert!(matches!(
            product.handle(&decrement(&product, 1)),
            Err(DomainError::Validation(msg)) if msg.contains("inactive")
        ));

        let cmd = increment(&product, 2);
        product.execute(&cmd).unwrap();
        assert_eq!(product.stock(), 7);
        assert_eq!(product.status(), ProductStatus::Inactive);

        // Re-sending the current flag is a no-op.
        assert!(product.handle(&cmd_set(&product, false)).unwrap().is_empty());
    }

    fn cmd_set(product: &Product, active: bool) -> ProductCommand {
        ProductCommand::SetActive(SetProductActive {
            product_id: product.id_typed(),
            active,
            occurred_at: test_time(),
        })
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Take(i64),
            Give(i64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(1i64..20).prop_map(Op::Take), (1i64..20).prop_map(Op::Give)]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: whatever sequence of decrements/increments is attempted,
            /// stock never goes negative and the status tracks stock == 0.
            #[test]
            fn stock_never_negative_and_status_tracks_zero(
                initial in 0i64..50,
                ops in prop::collection::vec(op(), 0..40)
            ) {
                let mut product = registered(initial, 3);
                let mut expected = initial;

                for op in ops {
                    let cmd = match op {
                        Op::Take(q) => decrement(&product, q),
                        Op::Give(q) => increment(&product, q),
                    };
                    match (product.execute(&cmd), op) {
                        (Ok(_), Op::Take(q)) => expected -= q,
                        (Ok(_), Op::Give(q)) => expected += q,
                        (Err(DomainError::InsufficientStock { .. }), Op::Take(q)) => {
                            prop_assert!(q > expected);
                        }
                        (Err(e), _) => prop_assert!(false, "unexpected error {e:?}"),
                    }

                    prop_assert!(product.stock() >= 0);
                    prop_assert_eq!(product.stock(), expected);
                    prop_assert_eq!(
                        product.status() == ProductStatus::OutOfStock,
                        product.stock() == 0
                    );
                }
            }
        }
    }
}
