use rusqlite::Connection;
use workdeck_core::db::open_db_in_memory;
use workdeck_core::{
    DirectoryRepository, MemoryCache, NewProject, NewTask, Principal, Project, ProjectService,
    RoleLabel, ServiceError, SqliteDirectoryRepository, SqliteProjectRepository,
    SqliteTaskRepository, SqliteTeamRepository, TaskService, TaskStatus, TeamService,
    UpdateTask,
};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn principal(conn: &Connection, name: &str) -> Principal {
    SqliteDirectoryRepository::new(conn)
        .create_principal(name, &format!("{name}@example.com"))
        .unwrap()
}

fn task_service(
    conn: &Connection,
) -> TaskService<SqliteTaskRepository<'_>, SqliteDirectoryRepository<'_>, MemoryCache> {
    TaskService::new(
        SqliteTaskRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    )
}

/// Team owned by `owner`; project managed by `manager` with the given
/// extra member-role workers.
fn seed_project(
    conn: &Connection,
    owner: &Principal,
    manager: &Principal,
    workers: &[&Principal],
) -> Project {
    let teams = TeamService::new(
        SqliteTeamRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    );
    let mut member_ids: Vec<_> = workers.iter().map(|worker| worker.id).collect();
    member_ids.push(manager.id);
    let team = teams.create_team(owner.id, "crew", &member_ids).unwrap();

    let projects = ProjectService::new(
        SqliteProjectRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    );
    projects
        .create_project(
            manager.id,
            &NewProject {
                team_id: team.id,
                name: "deck".to_string(),
                description: String::new(),
                due_date_ms: None,
                worker_ids: workers.iter().map(|worker| worker.id).collect(),
            },
        )
        .unwrap()
}

fn new_task(project: &Project, assignee: &Principal) -> NewTask {
    NewTask {
        project_id: project.id,
        name: "Ship It".to_string(),
        description: "<b>soon</b>".to_string(),
        status: None,
        priority: None,
        due_date_ms: None,
        assignee_id: assignee.id,
    }
}

#[test]
fn new_tasks_default_to_pending_and_sanitized_description() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = task_service(&conn);
    let (task, _event) = service.create_task(manager.id, &new_task(&project, &manager)).unwrap();

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.name, "ship it");
    assert_eq!(task.description, "soon");
}

#[test]
fn task_creation_requires_project_worker() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let outsider = principal(&conn, "outsider");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = task_service(&conn);
    let err = service
        .create_task(outsider.id, &new_task(&project, &manager))
        .unwrap_err();
    match err {
        ServiceError::Forbidden(reason) => assert!(reason.contains("not a worker")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn assignee_must_be_a_project_worker() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let outsider = principal(&conn, "outsider");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = task_service(&conn);
    let err = service
        .create_task(manager.id, &new_task(&project, &outsider))
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotEligible(_)));
}

#[test]
fn members_assign_only_to_themselves() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    let project = seed_project(&conn, &owner, &manager, &[&alma, &bo]);

    let service = task_service(&conn);

    let err = service
        .create_task(alma.id, &new_task(&project, &bo))
        .unwrap_err();
    match err {
        ServiceError::Forbidden(reason) => assert!(reason.contains("themselves")),
        other => panic!("unexpected error: {other}"),
    }

    // Self-assignment is fine for members; managers assign freely.
    service.create_task(alma.id, &new_task(&project, &alma)).unwrap();
    service.create_task(manager.id, &new_task(&project, &bo)).unwrap();
}

#[test]
fn view_is_limited_to_manager_and_assignee() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    let project = seed_project(&conn, &owner, &manager, &[&alma, &bo]);

    let service = task_service(&conn);
    let (task, _event) = service
        .create_task(manager.id, &new_task(&project, &alma))
        .unwrap();

    assert!(service.show_task(manager.id, task.id).is_ok());
    assert!(service.show_task(alma.id, task.id).is_ok());

    let err = service.show_task(bo.id, task.id).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    // Neither the team owner nor an admin bypasses task view.
    let err = service.show_task(owner.id, task.id).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let admin = principal(&conn, "root");
    SqliteDirectoryRepository::new(&conn)
        .grant_label(admin.id, RoleLabel::Admin)
        .unwrap();
    let err = service.show_task(admin.id, task.id).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn admin_may_assign_within_the_worker_set() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let project = seed_project(&conn, &owner, &manager, &[&alma]);

    let admin = principal(&conn, "root");
    SqliteDirectoryRepository::new(&conn)
        .grant_label(admin.id, RoleLabel::Admin)
        .unwrap();

    let service = task_service(&conn);
    let (task, _event) = service
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();

    let (task, _event) = service.assign_task(admin.id, task.id, alma.id).unwrap();
    assert_eq!(task.assignee_id, alma.id);
}

#[test]
fn update_respects_task_policy() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    let project = seed_project(&conn, &owner, &manager, &[&alma, &bo]);

    let service = task_service(&conn);
    let (task, _event) = service
        .create_task(manager.id, &new_task(&project, &alma))
        .unwrap();

    let patch = UpdateTask {
        status: Some(TaskStatus::Active),
        ..UpdateTask::default()
    };
    let task = service.update_task(alma.id, task.id, &patch).unwrap();
    assert_eq!(task.status, TaskStatus::Active);

    let err = service.update_task(bo.id, task.id, &patch).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn overdue_sweep_is_scoped_and_idempotent() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = task_service(&conn);
    let mut late = new_task(&project, &manager);
    late.due_date_ms = Some(1_000);
    let (late, _event) = service.create_task(manager.id, &late).unwrap();

    let mut done = new_task(&project, &manager);
    done.due_date_ms = Some(1_000);
    done.status = Some(TaskStatus::Completed);
    service.create_task(manager.id, &done).unwrap();

    let mut future = new_task(&project, &manager);
    future.due_date_ms = Some(10_000);
    service.create_task(manager.id, &future).unwrap();

    assert_eq!(service.mark_overdue_tasks(5_000).unwrap(), 1);
    let late = service.show_task(manager.id, late.id).unwrap();
    assert_eq!(late.status, TaskStatus::Overdue);

    // Already-swept rows are not touched again.
    assert_eq!(service.mark_overdue_tasks(5_000).unwrap(), 0);
}

#[test]
fn delete_cascades_comments_and_reports_blobs() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = task_service(&conn);
    let (task, _event) = service
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();

    conn.execute(
        "INSERT INTO comments (id, parent_kind, parent_id, author_id, body)
         VALUES ('c1', 'task', ?1, ?2, 'note');",
        rusqlite::params![task.id.to_string(), manager.id.to_string()],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO attachments (id, parent_kind, parent_id, path, file_name, file_size, mime_type)
         VALUES ('a1', 'task', ?1, 'files_tasks/xspec.pdf', 'spec.pdf', 4, 'application/pdf');",
        [task.id.to_string()],
    )
    .unwrap();

    let orphaned = service.delete_task(manager.id, task.id).unwrap();
    assert_eq!(orphaned, vec!["files_tasks/xspec.pdf".to_string()]);

    let comments: i64 = conn
        .query_row("SELECT COUNT(*) FROM comments;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(comments, 0);
}
