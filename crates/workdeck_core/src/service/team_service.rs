//! Team use-case service.
//!
//! # Responsibility
//! - Team CRUD, membership maintenance and ownership transfer, gated by
//!   the authorization evaluator.
//!
//! # Invariants
//! - The creator becomes the owner and an implicit member.
//! - Ownership transfer preconditions are enforced inside the repository
//!   transaction; this layer contributes the `Forbidden` gate and cache
//!   invalidation.

use crate::cache::{keys, Cache};
use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::team::{Team, TeamId};
use crate::policy::{team_access, Actor, TeamAction};
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::team_repo::TeamRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};
use log::info;

/// Partial update for a team. `None` fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTeam {
    pub name: Option<String>,
    /// Changing the owner runs a full ownership transfer.
    pub owner_id: Option<PrincipalId>,
    /// Members to attach on top of the existing set.
    pub member_ids: Vec<PrincipalId>,
}

/// Team service facade.
pub struct TeamService<R, D, C> {
    repo: R,
    directory: D,
    cache: C,
}

impl<R, D, C> TeamService<R, D, C>
where
    R: TeamRepository,
    D: DirectoryRepository,
    C: Cache,
{
    pub fn new(repo: R, directory: D, cache: C) -> Self {
        Self {
            repo,
            directory,
            cache,
        }
    }

    fn actor(&self, id: PrincipalId) -> ServiceResult<Actor> {
        Ok(Actor::new(id, self.directory.labels_for(id)?))
    }

    /// Lists the teams the actor is entitled to see: all for admins, owned
    /// teams for team owners, nothing otherwise.
    pub fn list_teams(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Team>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_teams(), || self.repo.list_teams());
        }
        if actor.has(RoleLabel::TeamOwner) {
            return cached_list(&self.cache, &keys::owner_teams(actor_id), || {
                self.repo.list_owned(actor_id)
            });
        }
        Ok(Vec::new())
    }

    /// Loads one team for a caller entitled to view it.
    pub fn show_team(&self, actor_id: PrincipalId, team_id: TeamId) -> ServiceResult<Team> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::View, &team))?;
        Ok(team)
    }

    /// Creates a team owned by the actor.
    pub fn create_team(
        &self,
        actor_id: PrincipalId,
        name: &str,
        member_ids: &[PrincipalId],
    ) -> ServiceResult<Team> {
        let team = self.repo.create_team(name, actor_id, member_ids)?;
        self.forget_team_listings(&[actor_id]);
        info!(
            "event=team_create module=service status=ok team={} owner={actor_id} members={}",
            team.id,
            member_ids.len()
        );
        Ok(team)
    }

    /// Applies a partial update; an owner change runs the transfer engine.
    pub fn update_team(
        &self,
        actor_id: PrincipalId,
        team_id: TeamId,
        patch: &UpdateTeam,
    ) -> ServiceResult<Team> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::Update, &team))?;

        if let Some(new_owner) = patch.owner_id {
            if new_owner != team.owner_id {
                self.transfer_ownership(actor_id, team_id, new_owner)?;
            }
        }
        if let Some(name) = &patch.name {
            self.repo.rename_team(team_id, name)?;
        }
        if !patch.member_ids.is_empty() {
            self.repo.add_members(team_id, &patch.member_ids)?;
        }

        self.forget_team_listings(&[actor_id, team.owner_id]);
        self.require_team(team_id)
    }

    /// Deletes a team with everything it owns. Returns the blob paths of
    /// attachments removed by the cascade so the caller can clear them
    /// from the blob store.
    pub fn delete_team(
        &self,
        actor_id: PrincipalId,
        team_id: TeamId,
    ) -> ServiceResult<Vec<String>> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::Delete, &team))?;

        let orphaned = self.repo.delete_team(team_id)?;
        self.forget_team_listings(&[actor_id, team.owner_id]);
        info!(
            "event=team_delete module=service status=ok team={team_id} orphaned_blobs={}",
            orphaned.len()
        );
        Ok(orphaned)
    }

    /// Attaches members to the team.
    pub fn add_members(
        &self,
        actor_id: PrincipalId,
        team_id: TeamId,
        member_ids: &[PrincipalId],
    ) -> ServiceResult<Team> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::AddMembers, &team))?;

        self.repo.add_members(team_id, member_ids)?;
        self.forget_team_listings(&[actor_id, team.owner_id]);
        self.require_team(team_id)
    }

    /// Detaches members. Removing the current owner is rejected with
    /// `InvariantViolation`.
    pub fn remove_members(
        &self,
        actor_id: PrincipalId,
        team_id: TeamId,
        member_ids: &[PrincipalId],
    ) -> ServiceResult<Team> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::RemoveMembers, &team))?;

        self.repo.remove_members(team_id, member_ids)?;
        self.forget_team_listings(&[actor_id, team.owner_id]);
        self.require_team(team_id)
    }

    /// Moves team ownership to `new_owner`.
    ///
    /// Preconditions, in order: the caller is the current owner or an
    /// admin; the target is a team member; the target is not already the
    /// owner. All are re-checked inside the repository transaction.
    pub fn transfer_ownership(
        &self,
        actor_id: PrincipalId,
        team_id: TeamId,
        new_owner: PrincipalId,
    ) -> ServiceResult<Team> {
        let actor = self.actor(actor_id)?;
        let team = self.require_team(team_id)?;
        ensure_allowed(team_access(&actor, TeamAction::TransferOwnership, &team))?;

        let previous_owner = team.owner_id;
        let team = self.repo.transfer_ownership(team_id, new_owner)?;

        self.forget_team_listings(&[previous_owner, new_owner, actor_id]);
        info!(
            "event=ownership_transfer module=service status=ok team={team_id} from={previous_owner} to={new_owner}"
        );
        Ok(team)
    }

    fn require_team(&self, team_id: TeamId) -> ServiceResult<Team> {
        self.repo
            .get_team(team_id)?
            .ok_or(ServiceError::NotFound {
                what: "team",
                id: team_id,
            })
    }

    fn forget_team_listings(&self, principals: &[PrincipalId]) {
        self.cache.forget(&keys::all_teams());
        for principal in principals {
            self.cache.forget(&keys::owner_teams(*principal));
        }
    }
}
