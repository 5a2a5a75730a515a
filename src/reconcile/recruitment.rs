//! Recruitment settings per facility.
use crate::model::Facility;
use crate::provider::Action;
use crate::schema::RecruitmentTarget;

/// Actions that bring a facility's recruitment settings to the target.
pub fn recruitment_actions(facility: &Facility, target: &RecruitmentTarget) -> Vec<Action> {
    let mut actions = Vec::new();
    if !facility.recruitment_active {
        actions.push(Action::SetRecruitment {
            facility_id: facility.id.clone(),
            duration: target.duration,
        });
    }
    if facility.crew_target != Some(target.target_crew) {
        actions.push(Action::SetCrewTarget {
            facility_id: facility.id.clone(),
            target: target.target_crew,
        });
    }
    actions
}
