//! Project use-case service.
//!
//! # Responsibility
//! - Project CRUD, worker-edge maintenance and manager transfer, gated by
//!   the authorization evaluator.
//!
//! # Invariants
//! - The creator becomes the single manager edge.
//! - Worker removal never silently reassigns tasks; dangling assignments
//!   are counted and logged instead.

use crate::cache::{keys, Cache};
use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::project::{NewProject, Project, ProjectId, UpdateProject, WorkerEdge, WorkerRole};
use crate::policy::{project_access, Actor, ProjectAction, ProjectFacts};
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::project_repo::ProjectRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};
use log::{info, warn};

/// Project service facade.
pub struct ProjectService<R, D, C> {
    repo: R,
    directory: D,
    cache: C,
}

impl<R, D, C> ProjectService<R, D, C>
where
    R: ProjectRepository,
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

    fn facts_for(&self, actor_id: PrincipalId, project_id: ProjectId) -> ServiceResult<ProjectFacts> {
        Ok(ProjectFacts {
            team_owner: self.repo.team_owner_id(project_id)?,
            actor_role: self.repo.role_in_project(actor_id, project_id)?,
        })
    }

    /// Lists the projects the actor is entitled to see: all for admins,
    /// the team's projects for team owners, managed projects for project
    /// managers, nothing otherwise.
    pub fn list_projects(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Project>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_projects(), || {
                self.repo.list_projects()
            });
        }
        if actor.has(RoleLabel::TeamOwner) {
            return cached_list(&self.cache, &keys::owner_projects(actor_id), || {
                self.repo.list_for_team_owner(actor_id)
            });
        }
        if actor.has(RoleLabel::ProjectManager) {
            return cached_list(&self.cache, &keys::manager_projects(actor_id), || {
                self.repo.list_managed(actor_id)
            });
        }
        Ok(Vec::new())
    }

    /// Loads one project for a caller entitled to view it.
    pub fn show_project(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
    ) -> ServiceResult<Project> {
        let actor = self.actor(actor_id)?;
        let project = self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::View, &facts))?;
        Ok(project)
    }

    /// Creates a project on a team the actor belongs to (or any team for
    /// admins). The creator becomes the manager.
    pub fn create_project(
        &self,
        actor_id: PrincipalId,
        request: &NewProject,
    ) -> ServiceResult<Project> {
        let actor = self.actor(actor_id)?;
        if !actor.is_admin() && !self.repo.is_team_member(request.team_id, actor_id)? {
            return Err(ServiceError::Forbidden(
                "You do not have the permissions to create a project for this team.".to_string(),
            ));
        }

        let project = self.repo.create_project(request, actor_id)?;
        self.forget_project_listings(&[actor_id, project.created_by]);
        info!(
            "event=project_create module=service status=ok project={} team={} manager={actor_id}",
            project.id, project.team_id
        );
        Ok(project)
    }

    /// Applies a partial update.
    pub fn update_project(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
        patch: &UpdateProject,
    ) -> ServiceResult<Project> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::Update, &facts))?;

        let project = self.repo.update_project(project_id, patch)?;
        self.forget_project_listings(&[actor_id, facts.team_owner]);
        Ok(project)
    }

    /// Deletes a project with everything it owns. Returns the blob paths
    /// of attachments removed by the cascade.
    pub fn delete_project(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
    ) -> ServiceResult<Vec<String>> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::Delete, &facts))?;

        let orphaned = self.repo.delete_project(project_id)?;
        self.forget_project_listings(&[actor_id, facts.team_owner]);
        info!(
            "event=project_delete module=service status=ok project={project_id} orphaned_blobs={}",
            orphaned.len()
        );
        Ok(orphaned)
    }

    /// Attaches member-role worker edges.
    pub fn add_workers(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
        worker_ids: &[PrincipalId],
    ) -> ServiceResult<Vec<WorkerEdge>> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::AddWorkers, &facts))?;

        self.repo.add_workers(project_id, worker_ids)?;
        self.forget_project_listings(&[actor_id, facts.team_owner]);
        Ok(self.repo.worker_edges(project_id)?)
    }

    /// Attaches one worker edge with an explicit role. Adding a second
    /// manager edge is rejected with `RoleConflict`.
    pub fn add_worker(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
        principal: PrincipalId,
        role: WorkerRole,
    ) -> ServiceResult<Vec<WorkerEdge>> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::AddWorkers, &facts))?;

        self.repo.add_worker(project_id, principal, role)?;
        self.forget_project_listings(&[actor_id, facts.team_owner, principal]);
        Ok(self.repo.worker_edges(project_id)?)
    }

    /// Detaches worker edges. Removing the manager is rejected; tasks left
    /// assigned to removed workers are kept and logged, not reassigned.
    pub fn remove_workers(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
        worker_ids: &[PrincipalId],
    ) -> ServiceResult<Vec<WorkerEdge>> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::RemoveWorkers, &facts))?;

        let dangling = self.repo.remove_workers(project_id, worker_ids)?;
        if dangling > 0 {
            warn!(
                "event=worker_remove module=service status=ok project={project_id} dangling_assignments={dangling}"
            );
        }
        self.forget_project_listings(&[actor_id, facts.team_owner]);
        for worker in worker_ids {
            self.cache.forget(&keys::manager_projects(*worker));
        }
        Ok(self.repo.worker_edges(project_id)?)
    }

    /// Moves the manager role to `new_manager`.
    ///
    /// Preconditions, in order: the caller is the parent team's owner or
    /// an admin; the target is a project worker; the target is not already
    /// the manager. All are re-checked inside the repository transaction.
    pub fn transfer_manager(
        &self,
        actor_id: PrincipalId,
        project_id: ProjectId,
        new_manager: PrincipalId,
    ) -> ServiceResult<Project> {
        let actor = self.actor(actor_id)?;
        self.require_project(project_id)?;
        let facts = self.facts_for(actor_id, project_id)?;
        ensure_allowed(project_access(&actor, ProjectAction::ChangeManager, &facts))?;

        let previous_manager = self.repo.manager_of(project_id)?;
        let project = self.repo.transfer_manager(project_id, new_manager)?;

        self.forget_project_listings(&[actor_id, facts.team_owner, new_manager]);
        if let Some(previous) = previous_manager {
            self.cache.forget(&keys::manager_projects(previous));
        }
        info!(
            "event=manager_transfer module=service status=ok project={project_id} from={previous} to={new_manager}",
            previous = previous_manager
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(project)
    }

    /// Lists completed projects for admins and team owners.
    pub fn completed_projects(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Project>> {
        self.require_reporting_access(actor_id)?;
        cached_list(&self.cache, &keys::completed_projects(), || {
            self.repo.completed_projects()
        })
    }

    /// Per-project completed-task counts for admins and team owners.
    pub fn completed_task_counts(
        &self,
        actor_id: PrincipalId,
    ) -> ServiceResult<Vec<(ProjectId, u32)>> {
        self.require_reporting_access(actor_id)?;
        cached_list(&self.cache, &keys::completed_task_counts(), || {
            self.repo.completed_task_counts()
        })
    }

    /// Flips past-due, non-completed projects to `overdue`. Intended for a
    /// periodic scheduler; no acting principal.
    pub fn mark_overdue_projects(&self, now_ms: i64) -> ServiceResult<u32> {
        let changed = self.repo.mark_overdue(now_ms)?;
        if changed > 0 {
            self.cache.forget(&keys::all_projects());
            self.cache.forget(&keys::completed_projects());
            info!(
                "event=overdue_sweep module=service status=ok entity=project changed={changed}"
            );
        }
        Ok(changed)
    }

    fn require_project(&self, project_id: ProjectId) -> ServiceResult<Project> {
        self.repo
            .get_project(project_id)?
            .ok_or(ServiceError::NotFound {
                what: "project",
                id: project_id,
            })
    }

    fn require_reporting_access(&self, actor_id: PrincipalId) -> ServiceResult<()> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() || actor.has(RoleLabel::TeamOwner) {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "You do not have the permissions to view completed projects.".to_string(),
        ))
    }

    fn forget_project_listings(&self, principals: &[PrincipalId]) {
        self.cache.forget(&keys::all_projects());
        self.cache.forget(&keys::completed_projects());
        self.cache.forget(&keys::completed_task_counts());
        for principal in principals {
            self.cache.forget(&keys::owner_projects(*principal));
            self.cache.forget(&keys::manager_projects(*principal));
        }
    }
}
