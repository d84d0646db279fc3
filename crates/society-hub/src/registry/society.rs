use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::billing::MAX_BILL_AMOUNT_MINOR;
use super::{
    require_actor, require_admin, required_text, RegistryError, RegistryRecord, RegistryService,
    SocietyId,
};
use crate::actors::ActorContext;
use crate::ids;

pub const BILLING_DAYS: std::ops::RangeInclusive<u8> = 1..=28;

/// Per-society preferences used by billing and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocietySettings {
    pub currency: String,
    pub timezone: String,
    pub billing_day: u8,
    /// Flat fee added to each overdue bill.
    #[serde(default)]
    pub late_fee_minor: u64,
}

impl Default for SocietySettings {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            timezone: "Asia/Kolkata".to_string(),
            billing_day: 1,
            late_fee_minor: 0,
        }
    }
}

impl SocietySettings {
    /// Normalize the currency code and check every field.
    pub fn validated(mut self) -> Result<Self, RegistryError> {
        self.currency = self.currency.trim().to_ascii_uppercase();
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RegistryError::Validation(format!(
                "currency '{}' must be a three-letter code",
                self.currency
            )));
        }

        self.timezone = self.timezone.trim().to_string();
        if self.timezone.parse::<Tz>().is_err() {
            return Err(RegistryError::Validation(format!(
                "unknown timezone '{}'",
                self.timezone
            )));
        }

        if !BILLING_DAYS.contains(&self.billing_day) {
            return Err(RegistryError::Validation(format!(
                "billing day {} must be between 1 and 28",
                self.billing_day
            )));
        }

        if self.late_fee_minor > MAX_BILL_AMOUNT_MINOR {
            return Err(RegistryError::Validation(format!(
                "late fee must not exceed {MAX_BILL_AMOUNT_MINOR} minor units"
            )));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Society {
    pub id: SocietyId,
    pub name: String,
    pub address: String,
    pub settings: SocietySettings,
    pub created_at: DateTime<Utc>,
}

impl RegistryRecord for Society {
    type Id = SocietyId;

    fn id(&self) -> &SocietyId {
        &self.id
    }

    fn society_id(&self) -> &SocietyId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocietyDraft {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub settings: SocietySettings,
}

impl RegistryService {
    pub fn create_society(
        &self,
        ctx: &ActorContext,
        draft: SocietyDraft,
        now: DateTime<Utc>,
    ) -> Result<Society, RegistryError> {
        require_admin(ctx, "register societies")?;
        let name = required_text("society name", &draft.name)?;
        self.ensure_unique_name(&name, None)?;

        let society = Society {
            id: SocietyId(ids::next_id("soc")),
            name,
            address: draft.address.trim().to_string(),
            settings: draft.settings.validated()?,
            created_at: now,
        };
        let stored = self.stores.societies.insert(society)?;
        info!(society = %stored.id, "society registered");
        Ok(stored)
    }

    pub fn update_society(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        draft: SocietyDraft,
    ) -> Result<Society, RegistryError> {
        require_admin(ctx, "update societies")?;
        let mut society = self.get_society(ctx, society_id)?;
        let name = required_text("society name", &draft.name)?;
        self.ensure_unique_name(&name, Some(society_id))?;

        society.name = name;
        society.address = draft.address.trim().to_string();
        society.settings = draft.settings.validated()?;
        Ok(self.stores.societies.update(society)?)
    }

    pub fn get_society(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
    ) -> Result<Society, RegistryError> {
        require_actor(ctx)?;
        self.stores
            .societies
            .fetch(society_id)?
            .ok_or(RegistryError::NotFound("society"))
    }

    pub fn list_societies(&self, ctx: &ActorContext) -> Result<Vec<Society>, RegistryError> {
        require_actor(ctx)?;
        let mut societies = self.stores.societies.all()?;
        societies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(societies)
    }

    /// Remove a society that no longer has residents.
    pub fn delete_society(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
    ) -> Result<(), RegistryError> {
        require_admin(ctx, "delete societies")?;
        self.society_exists(society_id)?;
        if !self.stores.residents.list(society_id)?.is_empty() {
            return Err(RegistryError::Conflict(
                "society still has registered residents".to_string(),
            ));
        }
        self.stores.societies.remove(society_id)?;
        info!(society = %society_id, "society deleted");
        Ok(())
    }

    fn ensure_unique_name(
        &self,
        name: &str,
        except: Option<&SocietyId>,
    ) -> Result<(), RegistryError> {
        let taken = self.stores.societies.all()?.into_iter().any(|society| {
            Some(&society.id) != except && society.name.eq_ignore_ascii_case(name)
        });
        if taken {
            return Err(RegistryError::Conflict(format!(
                "a society named '{name}' already exists"
            )));
        }
        Ok(())
    }
}
