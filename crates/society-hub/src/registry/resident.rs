use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    optional_text, require_actor, require_admin, require_self_or_admin, required_text,
    RegistryError, RegistryRecord, RegistryService, ResidentId, SocietyId,
};
use crate::actors::ActorContext;
use crate::ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidentType {
    Owner,
    Tenant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub society_id: SocietyId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub unit_number: String,
    pub resident_type: ResidentType,
    /// Owning resident for tenants; always `None` for owners.
    pub owner_id: Option<ResidentId>,
    pub avatar_url: Option<String>,
    pub move_in_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl RegistryRecord for Resident {
    type Id = ResidentId;

    fn id(&self) -> &ResidentId {
        &self.id
    }

    fn society_id(&self) -> &SocietyId {
        &self.society_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentDraft {
    /// Caller-chosen id, used to line a resident up with an external identity.
    #[serde(default)]
    pub id: Option<ResidentId>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub unit_number: String,
    pub resident_type: ResidentType,
    #[serde(default)]
    pub owner_id: Option<ResidentId>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
}

struct CheckedResident {
    name: String,
    email: String,
    phone: Option<String>,
    unit_number: String,
    owner_id: Option<ResidentId>,
    avatar_url: Option<String>,
}

impl RegistryService {
    pub fn create_resident(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
        draft: ResidentDraft,
        now: DateTime<Utc>,
    ) -> Result<Resident, RegistryError> {
        require_admin(ctx, "register residents")?;
        self.society_exists(society_id)?;
        let checked = self.check_resident(society_id, &draft, None)?;
        let id = match &draft.id {
            Some(id) => ResidentId(required_text("resident id", &id.0)?),
            None => ResidentId(ids::next_id("res")),
        };

        let resident = Resident {
            id,
            society_id: society_id.clone(),
            name: checked.name,
            email: checked.email,
            phone: checked.phone,
            unit_number: checked.unit_number,
            resident_type: draft.resident_type,
            owner_id: checked.owner_id,
            avatar_url: checked.avatar_url,
            move_in_date: draft.move_in_date,
            created_at: now,
        };
        let stored = self.stores.residents.insert(resident)?;
        info!(
            resident = %stored.id,
            society = %stored.society_id,
            unit = %stored.unit_number,
            "resident registered"
        );
        Ok(stored)
    }

    /// Residents may edit their own profile; changing type or owner link is admin only.
    pub fn update_resident(
        &self,
        ctx: &ActorContext,
        resident_id: &ResidentId,
        draft: ResidentDraft,
    ) -> Result<Resident, RegistryError> {
        let actor = require_self_or_admin(ctx, resident_id, "edit this resident")?;
        let mut resident = self.fetch_resident(resident_id)?;
        let relinking =
            draft.resident_type != resident.resident_type || draft.owner_id != resident.owner_id;
        if relinking && !actor.is_admin() {
            return Err(RegistryError::Forbidden("change residency type"));
        }
        if resident.resident_type == ResidentType::Owner
            && draft.resident_type == ResidentType::Tenant
            && !self.tenants_of(&resident)?.is_empty()
        {
            return Err(RegistryError::Conflict(
                "owner still has linked tenants".to_string(),
            ));
        }

        let checked = self.check_resident(&resident.society_id, &draft, Some(resident_id))?;
        resident.name = checked.name;
        resident.email = checked.email;
        resident.phone = checked.phone;
        resident.unit_number = checked.unit_number;
        resident.resident_type = draft.resident_type;
        resident.owner_id = checked.owner_id;
        resident.avatar_url = checked.avatar_url;
        resident.move_in_date = draft.move_in_date;
        Ok(self.stores.residents.update(resident)?)
    }

    pub fn get_resident(
        &self,
        ctx: &ActorContext,
        resident_id: &ResidentId,
    ) -> Result<Resident, RegistryError> {
        require_actor(ctx)?;
        self.fetch_resident(resident_id)
    }

    /// Residents of a society ordered by unit, then name.
    pub fn list_residents(
        &self,
        ctx: &ActorContext,
        society_id: &SocietyId,
    ) -> Result<Vec<Resident>, RegistryError> {
        require_actor(ctx)?;
        let mut residents = self.stores.residents.list(society_id)?;
        residents.sort_by(|a, b| {
            a.unit_number
                .cmp(&b.unit_number)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(residents)
    }

    /// Delete a resident with their vehicles. Owners with tenants cannot be removed.
    pub fn delete_resident(
        &self,
        ctx: &ActorContext,
        resident_id: &ResidentId,
    ) -> Result<(), RegistryError> {
        require_admin(ctx, "remove residents")?;
        let resident = self.fetch_resident(resident_id)?;
        if !self.tenants_of(&resident)?.is_empty() {
            return Err(RegistryError::Conflict(
                "owner still has linked tenants".to_string(),
            ));
        }

        for vehicle in self.stores.vehicles.list(&resident.society_id)? {
            if &vehicle.resident_id == resident_id {
                self.stores.vehicles.remove(&vehicle.id)?;
            }
        }
        self.stores.residents.remove(resident_id)?;
        info!(resident = %resident_id, "resident removed");
        Ok(())
    }

    pub(crate) fn fetch_resident(&self, resident_id: &ResidentId) -> Result<Resident, RegistryError> {
        self.stores
            .residents
            .fetch(resident_id)?
            .ok_or(RegistryError::NotFound("resident"))
    }

    fn tenants_of(&self, owner: &Resident) -> Result<Vec<Resident>, RegistryError> {
        Ok(self
            .stores
            .residents
            .list(&owner.society_id)?
            .into_iter()
            .filter(|resident| resident.owner_id.as_ref() == Some(&owner.id))
            .collect())
    }

    fn check_resident(
        &self,
        society_id: &SocietyId,
        draft: &ResidentDraft,
        existing: Option<&ResidentId>,
    ) -> Result<CheckedResident, RegistryError> {
        let name = required_text("resident name", &draft.name)?;
        let unit_number = required_text("unit number", &draft.unit_number)?.to_ascii_uppercase();
        let email = required_text("email", &draft.email)?.to_ascii_lowercase();
        if !email.contains('@') {
            return Err(RegistryError::Validation(format!(
                "email '{email}' is not valid"
            )));
        }

        let neighbours = self.stores.residents.list(society_id)?;
        if neighbours
            .iter()
            .any(|resident| Some(&resident.id) != existing && resident.email == email)
        {
            return Err(RegistryError::Conflict(format!(
                "email '{email}' is already registered in this society"
            )));
        }

        let owner_id = match draft.resident_type {
            ResidentType::Owner => {
                if draft.owner_id.is_some() {
                    return Err(RegistryError::Validation(
                        "owners cannot be linked to another owner".to_string(),
                    ));
                }
                None
            }
            ResidentType::Tenant => {
                let owner_id = draft.owner_id.clone().ok_or_else(|| {
                    RegistryError::Validation("tenants must be linked to an owner".to_string())
                })?;
                let owner = neighbours
                    .iter()
                    .find(|resident| resident.id == owner_id)
                    .ok_or_else(|| {
                        RegistryError::Validation(format!(
                            "owner {owner_id} is not a resident of this society"
                        ))
                    })?;
                if owner.resident_type != ResidentType::Owner {
                    return Err(RegistryError::Validation(format!(
                        "resident {owner_id} is not an owner"
                    )));
                }
                Some(owner_id)
            }
        };

        Ok(CheckedResident {
            name,
            email,
            phone: optional_text(draft.phone.clone()),
            unit_number,
            owner_id,
            avatar_url: optional_text(draft.avatar_url.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{Actor, ActorRole};
    use crate::polls::RepositoryError;
    use crate::registry::{SocietyDraft, SocietySettings};
    use chrono::TimeZone;

    fn admin() -> ActorContext {
        ActorContext::authenticated(Actor {
            resident_id: ResidentId("res-admin".to_string()),
            role: ActorRole::Admin,
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
                    name: "Palm Grove".to_string(),
                    address: String::new(),
                    settings: SocietySettings::default(),
                },
                now(),
            )
            .expect("society");
        (service, society.id)
    }

    fn draft(name: &str, unit: &str, kind: ResidentType, owner: Option<&ResidentId>) -> ResidentDraft {
        ResidentDraft {
            id: None,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            unit_number: unit.to_string(),
            resident_type: kind,
            owner_id: owner.cloned(),
            avatar_url: None,
            move_in_date: None,
        }
    }

    #[test]
    fn tenants_need_an_owner_in_the_same_society() {
        let (service, society) = setup();
        assert!(matches!(
            service.create_resident(
                &admin(),
                &society,
                draft("Tara", "b-2", ResidentType::Tenant, None),
                now()
            ),
            Err(RegistryError::Validation(_))
        ));

        let owner = service
            .create_resident(&admin(), &society, draft("Omar", "b-2", ResidentType::Owner, None), now())
            .expect("owner");
        let tenant = service
            .create_resident(
                &admin(),
                &society,
                draft("Tara", "b-2", ResidentType::Tenant, Some(&owner.id)),
                now(),
            )
            .expect("tenant");
        assert_eq!(tenant.owner_id.as_ref(), Some(&owner.id));
        assert_eq!(tenant.unit_number, "B-2");

        match service.delete_resident(&admin(), &owner.id) {
            Err(RegistryError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        service.delete_resident(&admin(), &tenant.id).expect("tenant removed");
        service.delete_resident(&admin(), &owner.id).expect("owner removed");
    }

    #[test]
    fn admins_may_choose_the_resident_id() {
        let (service, society) = setup();
        let mut first = draft("Omar", "A-1", ResidentType::Owner, None);
        first.id = Some(ResidentId("  res-u1 ".to_string()));
        let stored = service
            .create_resident(&admin(), &society, first, now())
            .expect("resident with chosen id");
        assert_eq!(stored.id, ResidentId("res-u1".to_string()));
        assert_eq!(
            service.get_resident(&admin(), &stored.id).expect("lookup").id,
            stored.id
        );

        let mut clash = draft("Ines", "A-2", ResidentType::Owner, None);
        clash.id = Some(ResidentId("res-u1".to_string()));
        assert!(matches!(
            service.create_resident(&admin(), &society, clash, now()),
            Err(RegistryError::Repository(RepositoryError::Conflict))
        ));

        let mut blank = draft("Ines", "A-2", ResidentType::Owner, None);
        blank.id = Some(ResidentId("   ".to_string()));
        assert!(matches!(
            service.create_resident(&admin(), &society, blank, now()),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (service, society) = setup();
        service
            .create_resident(&admin(), &society, draft("Omar", "A-1", ResidentType::Owner, None), now())
            .expect("owner");
        assert!(matches!(
            service.create_resident(
                &admin(),
                &society,
                draft("Omar", "A-9", ResidentType::Owner, None),
                now()
            ),
            Err(RegistryError::Conflict(_))
        ));
    }

    #[test]
    fn residents_edit_their_profile_but_not_their_type() {
        let (service, society) = setup();
        let owner = service
            .create_resident(&admin(), &society, draft("Omar", "A-1", ResidentType::Owner, None), now())
            .expect("owner");
        let me = ActorContext::authenticated(Actor {
            resident_id: owner.id.clone(),
            role: ActorRole::Resident,
        });

        let mut change = draft("Omar", "A-1", ResidentType::Owner, None);
        change.avatar_url = Some("https://cdn.example.com/omar.png".to_string());
        let updated = service
            .update_resident(&me, &owner.id, change)
            .expect("profile updated");
        assert!(updated.avatar_url.is_some());

        let other = service
            .create_resident(&admin(), &society, draft("Ines", "A-2", ResidentType::Owner, None), now())
            .expect("second owner");
        assert!(matches!(
            service.update_resident(
                &me,
                &owner.id,
                draft("Omar", "A-1", ResidentType::Tenant, Some(&other.id))
            ),
            Err(RegistryError::Forbidden(_))
        ));
    }

    #[test]
    fn unknown_society_is_not_found() {
        let service = RegistryService::in_memory();
        assert!(matches!(
            service.create_resident(
                &admin(),
                &SocietyId("soc-missing".to_string()),
                draft("Omar", "A-1", ResidentType::Owner, None),
                now()
            ),
            Err(RegistryError::NotFound("society"))
        ));
    }
}
