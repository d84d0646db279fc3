use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    optional_text, require_self_or_admin, RegistryError, RegistryRecord, RegistryService,
    ResidentId, SocietyId,
};
use crate::actors::ActorContext;
use crate::ids;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub String);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Bicycle,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub society_id: SocietyId,
    pub resident_id: ResidentId,
    pub registration_number: String,
    pub vehicle_type: VehicleType,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub parking_slot: Option<String>,
    pub is_primary: bool,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl RegistryRecord for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> &VehicleId {
        &self.id
    }

    fn society_id(&self) -> &SocietyId {
        &self.society_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDraft {
    pub registration_number: String,
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub parking_slot: Option<String>,
}

/// Uppercase with all whitespace removed, e.g. `ka 01 ab 1234` -> `KA01AB1234`.
pub fn normalize_registration(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

impl RegistryService {
    /// Register a vehicle; a resident's first vehicle becomes primary.
    pub fn add_vehicle(
        &self,
        ctx: &ActorContext,
        resident_id: &ResidentId,
        draft: VehicleDraft,
        now: DateTime<Utc>,
    ) -> Result<Vehicle, RegistryError> {
        require_self_or_admin(ctx, resident_id, "register vehicles for this resident")?;
        let resident = self.fetch_resident(resident_id)?;
        let registration = self.check_registration(
            &resident.society_id,
            &draft.registration_number,
            None,
        )?;
        let is_primary = self.vehicles_of(&resident.society_id, resident_id)?.is_empty();

        let vehicle = Vehicle {
            id: VehicleId(ids::next_id("veh")),
            society_id: resident.society_id,
            resident_id: resident_id.clone(),
            registration_number: registration,
            vehicle_type: draft.vehicle_type,
            make: optional_text(draft.make),
            model: optional_text(draft.model),
            color: optional_text(draft.color),
            parking_slot: optional_text(draft.parking_slot),
            is_primary,
            sequence: ids::next_sequence(),
            created_at: now,
        };
        let stored = self.stores.vehicles.insert(vehicle)?;
        info!(vehicle = %stored.id, resident = %resident_id, primary = is_primary, "vehicle registered");
        Ok(stored)
    }

    pub fn update_vehicle(
        &self,
        ctx: &ActorContext,
        vehicle_id: &VehicleId,
        draft: VehicleDraft,
    ) -> Result<Vehicle, RegistryError> {
        let mut vehicle = self.fetch_vehicle(vehicle_id)?;
        require_self_or_admin(ctx, &vehicle.resident_id, "edit this vehicle")?;
        vehicle.registration_number = self.check_registration(
            &vehicle.society_id,
            &draft.registration_number,
            Some(vehicle_id),
        )?;
        vehicle.vehicle_type = draft.vehicle_type;
        vehicle.make = optional_text(draft.make);
        vehicle.model = optional_text(draft.model);
        vehicle.color = optional_text(draft.color);
        vehicle.parking_slot = optional_text(draft.parking_slot);
        Ok(self.stores.vehicles.update(vehicle)?)
    }

    /// Mark one vehicle primary and clear the flag on the resident's others.
    pub fn set_primary_vehicle(
        &self,
        ctx: &ActorContext,
        vehicle_id: &VehicleId,
    ) -> Result<Vehicle, RegistryError> {
        let target = self.fetch_vehicle(vehicle_id)?;
        require_self_or_admin(ctx, &target.resident_id, "edit this vehicle")?;

        let mut promoted = None;
        for mut vehicle in self.vehicles_of(&target.society_id, &target.resident_id)? {
            let is_target = &vehicle.id == vehicle_id;
            if vehicle.is_primary != is_target {
                vehicle.is_primary = is_target;
                vehicle = self.stores.vehicles.update(vehicle)?;
            }
            if is_target {
                promoted = Some(vehicle);
            }
        }
        promoted.ok_or(RegistryError::NotFound("vehicle"))
    }

    /// A resident's vehicles, primary first, then in registration order.
    pub fn list_vehicles(
        &self,
        ctx: &ActorContext,
        resident_id: &ResidentId,
    ) -> Result<Vec<Vehicle>, RegistryError> {
        require_self_or_admin(ctx, resident_id, "view this resident's vehicles")?;
        let resident = self.fetch_resident(resident_id)?;
        let mut vehicles = self.vehicles_of(&resident.society_id, resident_id)?;
        vehicles.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        Ok(vehicles)
    }

    /// Delete a vehicle; removing the primary promotes the oldest remaining one.
    pub fn delete_vehicle(
        &self,
        ctx: &ActorContext,
        vehicle_id: &VehicleId,
    ) -> Result<(), RegistryError> {
        let vehicle = self.fetch_vehicle(vehicle_id)?;
        require_self_or_admin(ctx, &vehicle.resident_id, "remove this vehicle")?;
        self.stores.vehicles.remove(vehicle_id)?;

        if vehicle.is_primary {
            let successor = self
                .vehicles_of(&vehicle.society_id, &vehicle.resident_id)?
                .into_iter()
                .min_by_key(|candidate| candidate.sequence);
            if let Some(mut successor) = successor {
                successor.is_primary = true;
                let successor = self.stores.vehicles.update(successor)?;
                info!(vehicle = %successor.id, "primary vehicle reassigned");
            }
        }
        Ok(())
    }

    fn fetch_vehicle(&self, vehicle_id: &VehicleId) -> Result<Vehicle, RegistryError> {
        self.stores
            .vehicles
            .fetch(vehicle_id)?
            .ok_or(RegistryError::NotFound("vehicle"))
    }

    fn vehicles_of(
        &self,
        society_id: &SocietyId,
        resident_id: &ResidentId,
    ) -> Result<Vec<Vehicle>, RegistryError> {
        Ok(self
            .stores
            .vehicles
            .list(society_id)?
            .into_iter()
            .filter(|vehicle| &vehicle.resident_id == resident_id)
            .collect())
    }

    fn check_registration(
        &self,
        society_id: &SocietyId,
        raw: &str,
        existing: Option<&VehicleId>,
    ) -> Result<String, RegistryError> {
        let registration = normalize_registration(raw);
        if registration.is_empty() {
            return Err(RegistryError::Validation(
                "registration number is required".to_string(),
            ));
        }
        let taken = self.stores.vehicles.list(society_id)?.into_iter().any(|vehicle| {
            Some(&vehicle.id) != existing && vehicle.registration_number == registration
        });
        if taken {
            return Err(RegistryError::Conflict(format!(
                "vehicle {registration} is already registered in this society"
            )));
        }
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{Actor, ActorRole};
    use crate::registry::{ResidentDraft, ResidentType, SocietyDraft, SocietySettings};
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

    fn setup() -> (RegistryService, ResidentId) {
        let service = RegistryService::in_memory();
        let society = service
            .create_society(
                &admin(),
                SocietyDraft {
                    name: "Cedar Heights".to_string(),
                    address: String::new(),
                    settings: SocietySettings::default(),
                },
                now(),
            )
            .expect("society");
        let owner = service
            .create_resident(
                &admin(),
                &society.id,
                ResidentDraft {
                    id: None,
                    name: "Priya".to_string(),
                    email: "priya@example.com".to_string(),
                    phone: None,
                    unit_number: "C-4".to_string(),
                    resident_type: ResidentType::Owner,
                    owner_id: None,
                    avatar_url: None,
                    move_in_date: None,
                },
                now(),
            )
            .expect("resident");
        (service, owner.id)
    }

    fn draft(registration: &str) -> VehicleDraft {
        VehicleDraft {
            registration_number: registration.to_string(),
            vehicle_type: VehicleType::Car,
            make: None,
            model: None,
            color: Some("Blue".to_string()),
            parking_slot: None,
        }
    }

    #[test]
    fn registration_is_normalized_and_unique() {
        let (service, owner) = setup();
        let vehicle = service
            .add_vehicle(&admin(), &owner, draft("ka 01 ab 1234"), now())
            .expect("vehicle");
        assert_eq!(vehicle.registration_number, "KA01AB1234");

        assert!(matches!(
            service.add_vehicle(&admin(), &owner, draft("KA01 AB1234"), now()),
            Err(RegistryError::Conflict(_))
        ));
    }

    #[test]
    fn exactly_one_primary_per_resident() {
        let (service, owner) = setup();
        let first = service
            .add_vehicle(&admin(), &owner, draft("MH12AA0001"), now())
            .expect("first");
        let second = service
            .add_vehicle(&admin(), &owner, draft("MH12AA0002"), now())
            .expect("second");
        assert!(first.is_primary);
        assert!(!second.is_primary);

        service
            .set_primary_vehicle(&admin(), &second.id)
            .expect("promote second");
        let vehicles = service.list_vehicles(&admin(), &owner).expect("list");
        assert_eq!(vehicles.iter().filter(|v| v.is_primary).count(), 1);
        assert_eq!(vehicles[0].id, second.id);
    }

    #[test]
    fn deleting_primary_promotes_oldest_remaining() {
        let (service, owner) = setup();
        let first = service
            .add_vehicle(&admin(), &owner, draft("DL01AA0001"), now())
            .expect("first");
        let second = service
            .add_vehicle(&admin(), &owner, draft("DL01AA0002"), now())
            .expect("second");
        service
            .add_vehicle(&admin(), &owner, draft("DL01AA0003"), now())
            .expect("third");

        service.delete_vehicle(&admin(), &first.id).expect("delete");
        let vehicles = service.list_vehicles(&admin(), &owner).expect("list");
        assert_eq!(vehicles.len(), 2);
        assert_eq!(vehicles[0].id, second.id);
        assert!(vehicles[0].is_primary);
        assert!(!vehicles[1].is_primary);
    }

    #[test]
    fn other_residents_cannot_touch_vehicles() {
        let (service, owner) = setup();
        let vehicle = service
            .add_vehicle(&admin(), &owner, draft("GJ05ZZ9999"), now())
            .expect("vehicle");
        let stranger = ActorContext::authenticated(Actor {
            resident_id: ResidentId("res-stranger".to_string()),
            role: ActorRole::Resident,
        });
        assert!(matches!(
            service.delete_vehicle(&stranger, &vehicle.id),
            Err(RegistryError::Forbidden(_))
        ));
    }
}
