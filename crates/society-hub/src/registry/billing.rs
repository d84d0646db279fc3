use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    require_actor, require_admin, require_self_or_admin, RegistryError, RegistryRecord,
    RegistryService, ResidentId, SocietyId,
};
use crate::actors::ActorContext;
use crate::ids;

/// Largest amount, in minor units, accepted for one bill or late fee.
pub const MAX_BILL_AMOUNT_MINOR: u64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillId(pub String);

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Pending,
    Paid,
}

/// Status as reported on a given day; overdue is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillState {
    Pending,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub society_id: SocietyId,
    pub resident_id: ResidentId,
    /// Billing month as `YYYY-MM`.
    pub period: String,
    pub amount_minor: u64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub description: String,
    pub status: BillStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    pub fn state(&self, today: NaiveDate) -> BillState {
        match self.status {
            BillStatus::Paid => BillState::Paid,
            BillStatus::Pending if self.due_date < today => BillState::Overdue,
            BillStatus::Pending => BillState::Pending,
        }
    }

    /// Flat society late fee, charged only while the bill is overdue.
    pub fn late_fee(&self, today: NaiveDate, late_fee_minor: u64) -> u64 {
        match self.state(today) {
            BillState::Overdue => late_fee_minor,
            BillState::Pending | BillState::Paid => 0,
        }
    }
}

impl RegistryRecord for Bill {
    type Id = BillId;

    fn id(&self) -> &BillId {
        &self.id
    }

    fn society_id(&self) -> &SocietyId {
        &self.society_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillDraft {
    pub resident_id: ResidentId,
    pub period: String,
    pub amount_minor: u64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillView {
    #[serde(flatten)]
    pub bill: Bill,
    pub state: BillState,
    pub late_fee_minor: u64,
    /// Amount plus late fee; zero once paid.
    pub amount_due_minor: u64,
}

/// Society-wide billing totals in minor currency units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillStats {
    pub total: u64,
    pub pending: u64,
    pub paid: u64,
    pub overdue: u64,
    pub total_billed_minor: u64,
    pub collected_minor: u64,
    /// Unpaid amounts plus late fees accrued on overdue bills.
    pub outstanding_minor: u64,
    pub late_fees_minor: u64,
}

fn add_minor(total: u64, amount: u64) -> Result<u64, RegistryError> {
    total.checked_add(amount).ok_or_else(|| {
        RegistryError::Validation("billing totals exceed the supported amount range".to_string())
    })
}

fn parse_period(raw: &str) -> Result<String, RegistryError> {
    let period = raw.trim();
    NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d")
        .map(|month| month.format("%Y-%m").to_string())
        .map_err(|_| RegistryError::Validation(format!("period '{period}' must be YYYY-MM")))
}

impl RegistryService {
    pub fn create_bill(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        draft: BillDraft,
        now: DateTime<Utc>,
    ) -> Result<Bill, RegistryError> {
        require_admin(ctx, "issue bills")?;
        let society = self.society(society_id)?;
        let resident = self.fetch_resident(&draft.resident_id)?;
        if &resident.society_id != society_id {
            return Err(RegistryError::Validation(format!(
                "resident {} does not belong to society {society_id}",
                resident.id
            )));
        }
        if draft.amount_minor == 0 {
            return Err(RegistryError::Validation(
                "bill amount must be greater than zero".to_string(),
            ));
        }
        if draft.amount_minor > MAX_BILL_AMOUNT_MINOR {
            return Err(RegistryError::Validation(format!(
                "bill amount must not exceed {MAX_BILL_AMOUNT_MINOR} minor units"
            )));
        }
        let period = parse_period(&draft.period)?;

        let duplicate = self
            .stores
            .bills
            .list(society_id)?
            .into_iter()
            .any(|bill| bill.resident_id == resident.id && bill.period == period);
        if duplicate {
            return Err(RegistryError::Conflict(format!(
                "resident {} already has a bill for {period}",
                resident.id
            )));
        }

        let bill = Bill {
            id: BillId(ids::next_id("bill")),
            society_id: society_id.clone(),
            resident_id: resident.id,
            period,
            amount_minor: draft.amount_minor,
            currency: society.settings.currency,
            due_date: draft.due_date,
            description: draft.description.trim().to_string(),
            status: BillStatus::Pending,
            paid_at: None,
            created_at: now,
        };
        let stored = self.stores.bills.insert(bill)?;
        info!(
            bill = %stored.id,
            resident = %stored.resident_id,
            amount_minor = stored.amount_minor,
            "bill issued"
        );
        Ok(stored)
    }

    /// Bills visible to the actor: all for admins, their own for residents.
    pub fn list_bills(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        today: NaiveDate,
    ) -> Result<Vec<BillView>, RegistryError> {
        let actor = require_actor(ctx)?;
        let society_fee = self.society(society_id)?.settings.late_fee_minor;
        let mut bills: Vec<Bill> = self
            .stores
            .bills
            .list(society_id)?
            .into_iter()
            .filter(|bill| actor.is_admin() || bill.resident_id == actor.resident_id)
            .collect();
        bills.sort_by(|a, b| b.due_date.cmp(&a.due_date).then_with(|| a.id.cmp(&b.id)));

        bills
            .into_iter()
            .map(|bill| -> Result<BillView, RegistryError> {
                let state = bill.state(today);
                let late_fee_minor = bill.late_fee(today, society_fee);
                let amount_due_minor = match state {
                    BillState::Paid => 0,
                    BillState::Pending | BillState::Overdue => {
                        add_minor(bill.amount_minor, late_fee_minor)?
                    }
                };
                Ok(BillView {
                    state,
                    late_fee_minor,
                    amount_due_minor,
                    bill,
                })
            })
            .collect()
    }

    pub fn mark_bill_paid(
        &self,
        ctx: &ActorContext,
        bill_id: &BillId,
        now: DateTime<Utc>,
    ) -> Result<Bill, RegistryError> {
        let mut bill = self.fetch_bill(bill_id)?;
        require_self_or_admin(ctx, &bill.resident_id, "pay this bill")?;
        if bill.status == BillStatus::Paid {
            return Err(RegistryError::Conflict(format!("bill {bill_id} is already paid")));
        }
        bill.status = BillStatus::Paid;
        bill.paid_at = Some(now);
        let stored = self.stores.bills.update(bill)?;
        info!(bill = %stored.id, "bill paid");
        Ok(stored)
    }

    pub fn delete_bill(&self, ctx: &ActorContext, bill_id: &BillId) -> Result<(), RegistryError> {
        require_admin(ctx, "delete bills")?;
        self.fetch_bill(bill_id)?;
        self.stores.bills.remove(bill_id)?;
        Ok(())
    }

    pub fn bill_stats(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        today: NaiveDate,
    ) -> Result<BillStats, RegistryError> {
        require_admin(ctx, "view billing totals")?;
        let late_fee_minor = self.society(society_id)?.settings.late_fee_minor;
        let mut stats = BillStats::default();
        for bill in self.stores.bills.list(society_id)? {
            stats.total += 1;
            stats.total_billed_minor = add_minor(stats.total_billed_minor, bill.amount_minor)?;
            match bill.state(today) {
                BillState::Paid => {
                    stats.paid += 1;
                    stats.collected_minor = add_minor(stats.collected_minor, bill.amount_minor)?;
                }
                BillState::Pending => {
                    stats.pending += 1;
                    stats.outstanding_minor =
                        add_minor(stats.outstanding_minor, bill.amount_minor)?;
                }
                BillState::Overdue => {
                    stats.overdue += 1;
                    stats.late_fees_minor = add_minor(stats.late_fees_minor, late_fee_minor)?;
                    stats.outstanding_minor = add_minor(
                        stats.outstanding_minor,
                        add_minor(bill.amount_minor, late_fee_minor)?,
                    )?;
                }
            }
        }
        Ok(stats)
    }

    /// Calendar date in the society's timezone, used for overdue checks.
    pub fn society_today(
        &self,
        society_id: &SocietyId,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate, RegistryError> {
        let society = self.society(society_id)?;
        let zone: Tz = society.settings.timezone.parse().map_err(|_| {
            RegistryError::Validation(format!("unknown timezone '{}'", society.settings.timezone))
        })?;
        Ok(now.with_timezone(&zone).date_naive())
    }

    fn fetch_bill(&self, bill_id: &BillId) -> Result<Bill, RegistryError> {
        self.stores
            .bills
            .fetch(bill_id)?
            .ok_or(RegistryError::NotFound("bill"))
    }
}
