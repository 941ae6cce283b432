//! Task use-case service.
//!
//! # Responsibility
//! - Task CRUD and assignment, gated by the authorization evaluator and
//!   the worker-edge assignment rules.
//! - Hand `TaskAssigned` events back to the caller for post-commit
//!   fan-out.
//!
//! # Invariants
//! - The assignee must be a project worker at assignment time; this is
//!   not re-validated retroactively.
//! - A `member`-role worker may only assign tasks to themself.

use crate::cache::{keys, Cache};
use crate::event::DomainEvent;
use crate::model::principal::{PrincipalId, RoleLabel};
use crate::model::project::WorkerRole;
use crate::model::task::{NewTask, Task, TaskId, UpdateTask};
use crate::policy::{task_access, Actor, TaskAction, TaskFacts};
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::task_repo::TaskRepository;
use crate::service::{cached_list, ensure_allowed, ServiceError, ServiceResult};
use log::info;

/// Task service facade.
pub struct TaskService<R, D, C> {
    repo: R,
    directory: D,
    cache: C,
}

impl<R, D, C> TaskService<R, D, C>
where
    R: TaskRepository,
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

    /// Lists the tasks the actor is entitled to see, in label order: all
    /// for admins, the teams' tasks for team owners, managed projects'
    /// tasks for project managers, own assignments for members.
    pub fn list_tasks(&self, actor_id: PrincipalId) -> ServiceResult<Vec<Task>> {
        let actor = self.actor(actor_id)?;
        if actor.is_admin() {
            return cached_list(&self.cache, &keys::all_tasks(), || self.repo.list_tasks());
        }
        if actor.has(RoleLabel::TeamOwner) {
            return cached_list(&self.cache, &keys::owner_tasks(actor_id), || {
                self.repo.list_for_team_owner(actor_id)
            });
        }
        if actor.has(RoleLabel::ProjectManager) {
            return cached_list(&self.cache, &keys::manager_tasks(actor_id), || {
                self.repo.list_managed(actor_id)
            });
        }
        if actor.has(RoleLabel::Member) {
            return cached_list(&self.cache, &keys::member_tasks(actor_id), || {
                self.repo.list_assigned(actor_id)
            });
        }
        Ok(Vec::new())
    }

    /// Loads one task for a caller entitled to view it (the parent
    /// project's manager or the assignee).
    pub fn show_task(&self, actor_id: PrincipalId, task_id: TaskId) -> ServiceResult<Task> {
        let actor = self.actor(actor_id)?;
        let task = self.require_task(task_id)?;
        let facts = TaskFacts {
            actor_role: self.repo.role_in_project(actor_id, task.project_id)?,
        };
        ensure_allowed(task_access(&actor, TaskAction::View, &task, &facts))?;
        Ok(task)
    }

    /// Creates a task and returns it with the `TaskAssigned` event to
    /// dispatch after commit.
    ///
    /// The actor must be a worker on the target project; a member-role
    /// actor may only assign the task to themself; the assignee must be a
    /// project worker.
    pub fn create_task(
        &self,
        actor_id: PrincipalId,
        request: &NewTask,
    ) -> ServiceResult<(Task, DomainEvent)> {
        let actor_role = self.repo.role_in_project(actor_id, request.project_id)?;
        let actor = self.actor(actor_id)?;
        if !actor.is_admin() && actor_role.is_none() {
            return Err(ServiceError::Forbidden(
                "You are not a worker on the project you are trying to add a task to."
                    .to_string(),
            ));
        }
        self.enforce_member_self_assignment(actor_role, actor_id, request.assignee_id)?;

        let task = self.repo.create_task(request)?;
        self.forget_task_listings(&[actor_id, task.assignee_id]);
        info!(
            "event=task_create module=service status=ok task={} project={} assignee={}",
            task.id, task.project_id, task.assignee_id
        );
        let event = DomainEvent::TaskAssigned { task_id: task.id };
        Ok((task, event))
    }

    /// Applies a partial update.
    pub fn update_task(
        &self,
        actor_id: PrincipalId,
        task_id: TaskId,
        patch: &UpdateTask,
    ) -> ServiceResult<Task> {
        let actor = self.actor(actor_id)?;
        let task = self.require_task(task_id)?;
        let facts = TaskFacts {
            actor_role: self.repo.role_in_project(actor_id, task.project_id)?,
        };
        ensure_allowed(task_access(&actor, TaskAction::Update, &task, &facts))?;

        let task = self.repo.update_task(task_id, patch)?;
        self.forget_task_listings(&[actor_id, task.assignee_id]);
        Ok(task)
    }

    /// Deletes a task with its comments and attachments. Returns the blob
    /// paths of attachments removed by the cascade.
    pub fn delete_task(
        &self,
        actor_id: PrincipalId,
        task_id: TaskId,
    ) -> ServiceResult<Vec<String>> {
        let actor = self.actor(actor_id)?;
        let task = self.require_task(task_id)?;
        let facts = TaskFacts {
            actor_role: self.repo.role_in_project(actor_id, task.project_id)?,
        };
        ensure_allowed(task_access(&actor, TaskAction::Delete, &task, &facts))?;

        let orphaned = self.repo.delete_task(task_id)?;
        self.forget_task_listings(&[actor_id, task.assignee_id]);
        info!(
            "event=task_delete module=service status=ok task={task_id} orphaned_blobs={}",
            orphaned.len()
        );
        Ok(orphaned)
    }

    /// Moves the assignee slot and returns the task with the
    /// `TaskAssigned` event to dispatch after commit. Reassignment never
    /// mutates notifications raised for earlier assignments.
    pub fn assign_task(
        &self,
        actor_id: PrincipalId,
        task_id: TaskId,
        assignee: PrincipalId,
    ) -> ServiceResult<(Task, DomainEvent)> {
        let actor = self.actor(actor_id)?;
        let task = self.require_task(task_id)?;
        let actor_role = self.repo.role_in_project(actor_id, task.project_id)?;
        let facts = TaskFacts { actor_role };
        ensure_allowed(task_access(&actor, TaskAction::Assign, &task, &facts))?;
        self.enforce_member_self_assignment(actor_role, actor_id, assignee)?;

        let previous_assignee = task.assignee_id;
        let task = self.repo.assign_task(task_id, assignee)?;
        self.forget_task_listings(&[actor_id, previous_assignee, assignee]);
        info!(
            "event=task_assign module=service status=ok task={task_id} from={previous_assignee} to={assignee}"
        );
        let event = DomainEvent::TaskAssigned { task_id };
        Ok((task, event))
    }

    /// Flips past-due, unfinished tasks to `overdue`. Intended for a
    /// periodic scheduler; no acting principal.
    pub fn mark_overdue_tasks(&self, now_ms: i64) -> ServiceResult<u32> {
        let changed = self.repo.mark_overdue(now_ms)?;
        if changed > 0 {
            self.cache.forget(&keys::all_tasks());
            info!("event=overdue_sweep module=service status=ok entity=task changed={changed}");
        }
        Ok(changed)
    }

    fn require_task(&self, task_id: TaskId) -> ServiceResult<Task> {
        self.repo.get_task(task_id)?.ok_or(ServiceError::NotFound {
            what: "task",
            id: task_id,
        })
    }

    /// A member-role worker cannot hand tasks to other workers.
    fn enforce_member_self_assignment(
        &self,
        actor_role: Option<WorkerRole>,
        actor_id: PrincipalId,
        assignee: PrincipalId,
    ) -> ServiceResult<()> {
        if actor_role == Some(WorkerRole::Member) && assignee != actor_id {
            return Err(ServiceError::Forbidden(
                "Members are only allowed to assign tasks to themselves.".to_string(),
            ));
        }
        Ok(())
    }

    fn forget_task_listings(&self, principals: &[PrincipalId]) {
        self.cache.forget(&keys::all_tasks());
        for principal in principals {
            self.cache.forget(&keys::owner_tasks(*principal));
            self.cache.forget(&keys::manager_tasks(*principal));
            self.cache.forget(&keys::member_tasks(*principal));
        }
    }
}
