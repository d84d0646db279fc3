use std::sync::Arc;

use tracing::debug;

use super::domain::{PollId, TargetAudience};
use super::repository::{AuthorizerError, ParticipationAuthorizer, PollRepository, SocietyAccess};
use crate::actors::Actor;
use crate::registry::{
    RegistryRepository, Resident, ResidentId, ResidentType, Society, SocietyId,
};

/// Eligibility from the resident registry: same society as the poll and a
/// residency type matching the poll's target audience.
pub struct AudienceAuthorizer<P> {
    polls: Arc<P>,
    societies: Arc<dyn RegistryRepository<Society>>,
    residents: Arc<dyn RegistryRepository<Resident>>,
}

impl<P: PollRepository> AudienceAuthorizer<P> {
    pub fn new(
        polls: Arc<P>,
        societies: Arc<dyn RegistryRepository<Society>>,
        residents: Arc<dyn RegistryRepository<Resident>>,
    ) -> Self {
        Self {
            polls,
            societies,
            residents,
        }
    }
}

fn unavailable(err: impl std::fmt::Display) -> AuthorizerError {
    AuthorizerError::Unavailable(err.to_string())
}

impl<P: PollRepository> ParticipationAuthorizer for AudienceAuthorizer<P> {
    fn can_participate(
        &self,
        poll_id: &PollId,
        resident_id: &ResidentId,
    ) -> Result<bool, AuthorizerError> {
        let poll = self
            .polls
            .fetch_poll(poll_id)
            .map_err(unavailable)?;
        let resident = self.residents.fetch(resident_id).map_err(unavailable)?;

        let (Some(aggregate), Some(resident)) = (poll, resident) else {
            debug!(poll = %poll_id, resident = %resident_id, "unknown poll or resident");
            return Ok(false);
        };
        if resident.society_id != aggregate.poll.society_id {
            return Ok(false);
        }

        Ok(match aggregate.poll.target_audience {
            TargetAudience::All => true,
            TargetAudience::Owners => resident.resident_type == ResidentType::Owner,
            TargetAudience::Tenants => resident.resident_type == ResidentType::Tenant,
        })
    }

    fn society_access(
        &self,
        society_id: &SocietyId,
        actor: &Actor,
    ) -> Result<SocietyAccess, AuthorizerError> {
        if self.societies.fetch(society_id).map_err(unavailable)?.is_none() {
            return Ok(SocietyAccess::UnknownSociety);
        }
        if actor.is_admin() {
            return Ok(SocietyAccess::Member);
        }
        let resident = self
            .residents
            .fetch(&actor.resident_id)
            .map_err(unavailable)?;
        Ok(match resident {
            Some(resident) if &resident.society_id == society_id => SocietyAccess::Member,
            _ => SocietyAccess::Outsider,
        })
    }
}
