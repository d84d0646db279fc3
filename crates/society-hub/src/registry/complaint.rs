use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    optional_text, require_actor, require_admin, required_text, RegistryError, RegistryRecord,
    RegistryService, ResidentId, SocietyId,
};
use crate::actors::ActorContext;
use crate::ids;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComplaintId(pub String);

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    Maintenance,
    Security,
    Noise,
    Parking,
    Cleanliness,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl ComplaintStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }

    pub fn can_move_to(self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (Open, Closed) | (InProgress, Resolved) | (Resolved, Closed) | (Resolved, Open)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub society_id: SocietyId,
    pub resident_id: ResidentId,
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl RegistryRecord for Complaint {
    type Id = ComplaintId;

    fn id(&self) -> &ComplaintId {
        &self.id
    }

    fn society_id(&self) -> &SocietyId {
        &self.society_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: ComplaintCategory,
    #[serde(default)]
    pub priority: ComplaintPriority,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplaintStats {
    pub total: u64,
    pub by_status: BTreeMap<ComplaintStatus, u64>,
    pub by_priority: BTreeMap<ComplaintPriority, u64>,
    /// Mean hours from filing to resolution, over complaints that were resolved.
    pub mean_resolution_hours: Option<f64>,
}

impl RegistryService {
    /// File a complaint on behalf of the calling resident.
    pub fn file_complaint(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        draft: ComplaintDraft,
        now: DateTime<Utc>,
    ) -> Result<Complaint, RegistryError> {
        let actor = require_actor(ctx)?;
        self.society_exists(society_id)?;

        let complaint = Complaint {
            id: ComplaintId(ids::next_id("cmp")),
            society_id: society_id.clone(),
            resident_id: actor.resident_id.clone(),
            title: required_text("complaint title", &draft.title)?,
            description: required_text("complaint description", &draft.description)?,
            category: draft.category,
            priority: draft.priority,
            status: ComplaintStatus::Open,
            resolution_note: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let stored = self.stores.complaints.insert(complaint)?;
        info!(complaint = %stored.id, society = %society_id, "complaint filed");
        Ok(stored)
    }

    /// Complaints newest first; residents only see their own.
    pub fn list_complaints(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
    ) -> Result<Vec<Complaint>, RegistryError> {
        let actor = require_actor(ctx)?;
        let mut complaints: Vec<Complaint> = self
            .stores
            .complaints
            .list(society_id)?
            .into_iter()
            .filter(|complaint| actor.is_admin() || complaint.resident_id == actor.resident_id)
            .collect();
        complaints.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(complaints)
    }

    pub fn update_complaint_status(
        &self,
        ctx: &ActorContext,
        complaint_id: &ComplaintId,
        status: ComplaintStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Complaint, RegistryError> {
        require_admin(ctx, "update complaint status")?;
        let mut complaint = self.fetch_complaint(complaint_id)?;
        if !complaint.status.can_move_to(status) {
            return Err(RegistryError::Conflict(format!(
                "complaint cannot move from {} to {}",
                complaint.status.label(),
                status.label()
            )));
        }

        match status {
            ComplaintStatus::Resolved => complaint.resolved_at = Some(now),
            ComplaintStatus::Open => complaint.resolved_at = None,
            ComplaintStatus::InProgress | ComplaintStatus::Closed => {}
        }
        if let Some(note) = optional_text(note) {
            complaint.resolution_note = Some(note);
        }
        let from = complaint.status;
        complaint.status = status;
        complaint.updated_at = now;

        let stored = self.stores.complaints.update(complaint)?;
        info!(complaint = %stored.id, from = from.label(), to = status.label(), "complaint status changed");
        Ok(stored)
    }

    pub fn delete_complaint(
        &self,
        ctx: &ActorContext,
        complaint_id: &ComplaintId,
    ) -> Result<(), RegistryError> {
        require_admin(ctx, "delete complaints")?;
        self.fetch_complaint(complaint_id)?;
        self.stores.complaints.remove(complaint_id)?;
        Ok(())
    }

    pub fn complaint_stats(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
    ) -> Result<ComplaintStats, RegistryError> {
        require_admin(ctx, "view complaint statistics")?;
        let mut stats = ComplaintStats::default();
        let mut resolution_hours = Vec::new();

        for complaint in self.stores.complaints.list(society_id)? {
            stats.total += 1;
            *stats.by_status.entry(complaint.status).or_insert(0) += 1;
            *stats.by_priority.entry(complaint.priority).or_insert(0) += 1;
            if let Some(resolved_at) = complaint.resolved_at {
                let minutes = (resolved_at - complaint.created_at).num_minutes();
                resolution_hours.push(minutes as f64 / 60.0);
            }
        }

        if !resolution_hours.is_empty() {
            let mean = resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64;
            stats.mean_resolution_hours = Some((mean * 100.0).round() / 100.0);
        }
        Ok(stats)
    }

    fn fetch_complaint(&self, complaint_id: &ComplaintId) -> Result<Complaint, RegistryError> {
        self.stores
            .complaints
            .fetch(complaint_id)?
            .ok_or(RegistryError::NotFound("complaint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{Actor, ActorRole};
    use crate::registry::{SocietyDraft, SocietySettings};
    use chrono::{Duration, TimeZone};

    fn admin() -> ActorContext {
        ActorContext::authenticated(Actor {
            resident_id: ResidentId("res-admin".to_string()),
            role: ActorRole::Admin,
        })
    }

    fn resident(id: &str) -> ActorContext {
        ActorContext::authenticated(Actor {
            resident_id: ResidentId(id.to_string()),
            role: ActorRole::Resident,
        })
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0)
            .single()
            .expect("valid")
    }

    fn setup() -> (RegistryService, SocietyId) {
        let service = RegistryService::in_memory();
        let society = service
            .create_society(
                &admin(),
                SocietyDraft {
                    name: "Birch Residency".to_string(),
                    address: String::new(),
                    settings: SocietySettings::default(),
                },
                now(),
            )
            .expect("society");
        (service, society.id)
    }

    fn draft(title: &str, priority: ComplaintPriority) -> ComplaintDraft {
        ComplaintDraft {
            title: title.to_string(),
            description: "Reported from the lobby".to_string(),
            category: ComplaintCategory::Maintenance,
            priority,
        }
    }

    #[test]
    fn transitions_follow_the_workflow() {
        assert!(ComplaintStatus::Open.can_move_to(ComplaintStatus::InProgress));
        assert!(ComplaintStatus::Resolved.can_move_to(ComplaintStatus::Open));
        assert!(!ComplaintStatus::Closed.can_move_to(ComplaintStatus::Open));
        assert!(!ComplaintStatus::InProgress.can_move_to(ComplaintStatus::Closed));
    }

    #[test]
    fn resolving_records_time_and_note() {
        let (service, society) = setup();
        let filed = service
            .file_complaint(&resident("res-7"), &society, draft("Lift stuck", ComplaintPriority::High), now())
            .expect("filed");
        assert_eq!(filed.status, ComplaintStatus::Open);

        service
            .update_complaint_status(&admin(), &filed.id, ComplaintStatus::InProgress, None, now())
            .expect("in progress");
        let resolved = service
            .update_complaint_status(
                &admin(),
                &filed.id,
                ComplaintStatus::Resolved,
                Some("Technician replaced relay".to_string()),
                now() + Duration::hours(6),
            )
            .expect("resolved");
        assert_eq!(resolved.resolved_at, Some(now() + Duration::hours(6)));
        assert_eq!(resolved.resolution_note.as_deref(), Some("Technician replaced relay"));

        assert!(matches!(
            service.update_complaint_status(&admin(), &filed.id, ComplaintStatus::InProgress, None, now()),
            Err(RegistryError::Conflict(_))
        ));
        assert!(matches!(
            service.update_complaint_status(&resident("res-7"), &filed.id, ComplaintStatus::Closed, None, now()),
            Err(RegistryError::Forbidden(_))
        ));
    }

    #[test]
    fn stats_count_by_status_and_priority() {
        let (service, society) = setup();
        let lift = service
            .file_complaint(&resident("res-1"), &society, draft("Lift", ComplaintPriority::High), now())
            .expect("lift");
        let noise = service
            .file_complaint(&resident("res-2"), &society, draft("Noise", ComplaintPriority::Low), now())
            .expect("noise");
        service
            .file_complaint(&resident("res-2"), &society, draft("Leak", ComplaintPriority::High), now())
            .expect("leak");

        for (complaint, hours) in [(&lift, 4), (&noise, 8)] {
            service
                .update_complaint_status(&admin(), &complaint.id, ComplaintStatus::InProgress, None, now())
                .expect("progress");
            service
                .update_complaint_status(
                    &admin(),
                    &complaint.id,
                    ComplaintStatus::Resolved,
                    None,
                    now() + Duration::hours(hours),
                )
                .expect("resolved");
        }

        let stats = service.complaint_stats(&admin(), &society).expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get(&ComplaintStatus::Resolved), Some(&2));
        assert_eq!(stats.by_status.get(&ComplaintStatus::Open), Some(&1));
        assert_eq!(stats.by_priority.get(&ComplaintPriority::High), Some(&2));
        assert_eq!(stats.mean_resolution_hours, Some(6.0));

        assert_eq!(
            service
                .list_complaints(&resident("res-2"), &society)
                .expect("own complaints")
                .len(),
            2
        );
    }
}
