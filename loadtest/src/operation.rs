//! Requests issued by simulated clients and how their responses are classified.

use std::fmt;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

/// Manufacturer label attached to every created product.
pub const MANUFACTURER: &str = "Test Manufacturer";

/// The kinds of operations a simulated client can perform.
///
/// Kinds are used to group metrics, so all reads of random products end up in the same bucket
/// regardless of the concrete identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OperationKind {
    /// `GET /health`
    Health,
    /// `GET /products/{id}` with an identifier that may or may not exist.
    ReadProduct,
    /// `POST /products/{id}/details` with a generated identifier.
    CreateProduct,
    /// `GET /products/{id}` with an identifier that never exists.
    ReadMissingProduct,
}

impl OperationKind {
    /// All operation kinds, in the order used for weighted selection.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ReadProduct,
        OperationKind::Health,
        OperationKind::CreateProduct,
        OperationKind::ReadMissingProduct,
    ];

    /// The name under which this operation is reported.
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Health => "/health",
            OperationKind::ReadProduct => "/products/[id]",
            OperationKind::CreateProduct => "/products/[id]/details",
            OperationKind::ReadMissingProduct => "/products/[id] (404)",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Product record sent with a create operation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProductDetails {
    pub product_id: u32,
    pub sku: String,
    pub manufacturer: String,
    pub category_id: u32,
    pub weight: u32,
    pub some_other_id: u32,
}

/// Formats the SKU for a product, zero-padded to five digits.
pub fn sku_for(product_id: u32) -> String {
    format!("SKU-{product_id:05}")
}

/// A single request with all of its parameters drawn.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Probe the health endpoint.
    Health,
    /// Read a product that may or may not exist.
    ReadProduct {
        /// Identifier in `1..=100`.
        product_id: u32,
    },
    /// Create product details under a counter-derived identifier.
    CreateProduct(ProductDetails),
    /// Read a product that must not exist.
    ReadMissingProduct {
        /// Identifier in `100_000..=999_999`.
        product_id: u32,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Health => OperationKind::Health,
            Operation::ReadProduct { .. } => OperationKind::ReadProduct,
            Operation::CreateProduct(_) => OperationKind::CreateProduct,
            Operation::ReadMissingProduct { .. } => OperationKind::ReadMissingProduct,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::CreateProduct(_) => Method::POST,
            _ => Method::GET,
        }
    }

    /// The request path, relative to the target host.
    pub fn path(&self) -> String {
        match self {
            Operation::Health => "/health".to_owned(),
            Operation::ReadProduct { product_id }
            | Operation::ReadMissingProduct { product_id } => format!("/products/{product_id}"),
            Operation::CreateProduct(details) => {
                format!("/products/{}/details", details.product_id)
            }
        }
    }

    /// The status codes this operation accepts as success.
    pub fn expectation(&self) -> Expectation {
        match self {
            Operation::Health | Operation::CreateProduct(_) => Expectation::Default,
            Operation::ReadProduct { .. } => {
                Expectation::OneOf(&[StatusCode::OK, StatusCode::NOT_FOUND])
            }
            Operation::ReadMissingProduct { .. } => Expectation::OneOf(&[StatusCode::NOT_FOUND]),
        }
    }
}

/// Success classification for a response status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Expectation {
    /// No explicit classification.
    ///
    /// Any status is accepted, unless strict classification is enabled in which case only
    /// statuses below 400 are.
    Default,
    /// Only the listed statuses are accepted.
    OneOf(&'static [StatusCode]),
}

impl Expectation {
    /// Returns `true` if the given status counts as a successful outcome.
    pub fn accepts(self, status: StatusCode, strict: bool) -> bool {
        match self {
            Expectation::Default => !strict || status.as_u16() < 400,
            Expectation::OneOf(accepted) => accepted.contains(&status),
        }
    }
}
