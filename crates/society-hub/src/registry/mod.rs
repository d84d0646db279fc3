//! Society registries: societies, residents, vehicles, bills, complaints and
//! the chatbot FAQ book.
//!
//! Each record type is stored through a [`RegistryRepository`]; the
//! [`RegistryService`] enforces cross-record rules (tenant to owner links,
//! primary vehicles, bill ownership) on top of them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::actors::{Actor, ActorContext, DirectoryError};
use crate::polls::RepositoryError;

pub mod billing;
pub mod complaint;
pub mod faq;
pub mod memory;
pub mod resident;
pub mod router;
pub mod society;
pub mod vehicle;

pub use billing::{
    Bill, BillDraft, BillId, BillState, BillStats, BillStatus, BillView, MAX_BILL_AMOUNT_MINOR,
};
pub use complaint::{
    Complaint, ComplaintCategory, ComplaintDraft, ComplaintId, ComplaintPriority,
    ComplaintStats, ComplaintStatus,
};
pub use faq::{FaqBook, FaqDraft, FaqEntry, FaqMatch};
pub use memory::InMemoryRegistry;
pub use resident::{Resident, ResidentDraft, ResidentType};
pub use router::registry_router;
pub use society::{Society, SocietyDraft, SocietySettings};
pub use vehicle::{Vehicle, VehicleDraft, VehicleId, VehicleType};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SocietyId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResidentId(pub String);

impl fmt::Display for SocietyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ResidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record stored in a registry table, scoped to one society.
pub trait RegistryRecord: Clone + Send + Sync + 'static {
    type Id: Clone + Ord + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
    fn society_id(&self) -> &SocietyId;
}

/// Storage contract shared by every registry table.
pub trait RegistryRepository<T: RegistryRecord>: Send + Sync {
    fn insert(&self, record: T) -> Result<T, RepositoryError>;
    fn update(&self, record: T) -> Result<T, RepositoryError>;
    fn fetch(&self, id: &T::Id) -> Result<Option<T>, RepositoryError>;
    fn list(&self, society_id: &SocietyId) -> Result<Vec<T>, RepositoryError>;
    fn all(&self) -> Result<Vec<T>, RepositoryError>;
    fn remove(&self, id: &T::Id) -> Result<(), RepositoryError>;
}

/// Table handles used by the registry service.
#[derive(Clone)]
pub struct RegistryStores {
    pub societies: Arc<dyn RegistryRepository<Society>>,
    pub residents: Arc<dyn RegistryRepository<Resident>>,
    pub vehicles: Arc<dyn RegistryRepository<Vehicle>>,
    pub bills: Arc<dyn RegistryRepository<Bill>>,
    pub complaints: Arc<dyn RegistryRepository<Complaint>>,
}

impl RegistryStores {
    pub fn in_memory() -> Self {
        Self {
            societies: Arc::new(InMemoryRegistry::<Society>::default()),
            residents: Arc::new(InMemoryRegistry::<Resident>::default()),
            vehicles: Arc::new(InMemoryRegistry::<Vehicle>::default()),
            bills: Arc::new(InMemoryRegistry::<Bill>::default()),
            complaints: Arc::new(InMemoryRegistry::<Complaint>::default()),
        }
    }
}

/// Service composing the registry tables and the FAQ book.
///
/// Operations for each record type live next to the type in its own module.
pub struct RegistryService {
    stores: RegistryStores,
    faqs: FaqBook,
}

impl RegistryService {
    pub fn new(stores: RegistryStores, faqs: FaqBook) -> Self {
        Self { stores, faqs }
    }

    pub fn in_memory() -> Self {
        Self::new(RegistryStores::in_memory(), FaqBook::with_defaults())
    }

    pub fn stores(&self) -> &RegistryStores {
        &self.stores
    }

    pub fn faqs(&self) -> &FaqBook {
        &self.faqs
    }

    fn society(&self, society_id: &SocietyId) -> Result<Society, RegistryError> {
        self.stores
            .societies
            .fetch(society_id)?
            .ok_or(RegistryError::NotFound("society"))
    }

    fn society_exists(&self, society_id: &SocietyId) -> Result<(), RegistryError> {
        self.society(society_id).map(|_| ())
    }
}

pub(crate) fn require_actor(ctx: &ActorContext) -> Result<&Actor, RegistryError> {
    ctx.actor().ok_or(RegistryError::Unauthenticated)
}

pub(crate) fn require_admin<'a>(
    ctx: &'a ActorContext,
    action: &'static str,
) -> Result<&'a Actor, RegistryError> {
    let actor = require_actor(ctx)?;
    if actor.is_admin() {
        Ok(actor)
    } else {
        Err(RegistryError::Forbidden(action))
    }
}

/// Admins act on anything; residents only on records they own.
pub(crate) fn require_self_or_admin<'a>(
    ctx: &'a ActorContext,
    owner: &ResidentId,
    action: &'static str,
) -> Result<&'a Actor, RegistryError> {
    let actor = require_actor(ctx)?;
    if actor.is_admin() || &actor.resident_id == owner {
        Ok(actor)
    } else {
        Err(RegistryError::Forbidden(action))
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> Result<String, RegistryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Error raised by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("you are not allowed to {0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
