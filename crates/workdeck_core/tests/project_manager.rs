use rusqlite::Connection;
use workdeck_core::db::open_db_in_memory;
use workdeck_core::{
    DirectoryRepository, MemoryCache, NewProject, NewTask, Principal, ProjectRepository,
    ProjectService, RoleLabel, ServiceError, SqliteDirectoryRepository, SqliteProjectRepository,
    SqliteTaskRepository, SqliteTeamRepository, TaskService, Team, TeamService, WorkerRole,
};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn principal(conn: &Connection, name: &str) -> Principal {
    SqliteDirectoryRepository::new(conn)
        .create_principal(name, &format!("{name}@example.com"))
        .unwrap()
}

fn team_with_members(conn: &Connection, owner: &Principal, members: &[&Principal]) -> Team {
    let service = TeamService::new(
        SqliteTeamRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    );
    let member_ids: Vec<_> = members.iter().map(|member| member.id).collect();
    service.create_team(owner.id, "crew", &member_ids).unwrap()
}

fn project_service(
    conn: &Connection,
) -> ProjectService<SqliteProjectRepository<'_>, SqliteDirectoryRepository<'_>, MemoryCache> {
    ProjectService::new(
        SqliteProjectRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    )
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

fn new_project(team: &Team, workers: &[&Principal]) -> NewProject {
    NewProject {
        team_id: team.id,
        name: "Deck".to_string(),
        description: "the main board".to_string(),
        due_date_ms: None,
        worker_ids: workers.iter().map(|worker| worker.id).collect(),
    }
}

fn has_label(conn: &Connection, principal: &Principal, label: RoleLabel) -> bool {
    SqliteDirectoryRepository::new(conn)
        .has_label(principal.id, label)
        .unwrap()
}

#[test]
fn creator_becomes_manager_with_labels() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let team = team_with_members(&conn, &owner, &[&m1]);

    let service = project_service(&conn);
    let project = service.create_project(m1.id, &new_project(&team, &[])).unwrap();

    let repo = SqliteProjectRepository::new(&conn);
    assert_eq!(repo.manager_of(project.id).unwrap(), Some(m1.id));
    assert_eq!(
        repo.role_in_project(m1.id, project.id).unwrap(),
        Some(WorkerRole::ProjectManager)
    );
    assert!(has_label(&conn, &m1, RoleLabel::ProjectManager));
    assert!(has_label(&conn, &m1, RoleLabel::Member));
}

#[test]
fn manager_transfer_swaps_edges_and_reconciles_labels() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let project = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();

    let project = service.transfer_manager(owner.id, project.id, w1.id).unwrap();

    let repo = SqliteProjectRepository::new(&conn);
    assert_eq!(repo.manager_of(project.id).unwrap(), Some(w1.id));
    assert_eq!(
        repo.role_in_project(m1.id, project.id).unwrap(),
        Some(WorkerRole::Member)
    );
    assert!(has_label(&conn, &w1, RoleLabel::ProjectManager));
    // m1 manages no other project, so the label is revoked.
    assert!(!has_label(&conn, &m1, RoleLabel::ProjectManager));
}

#[test]
fn manager_keeps_label_while_managing_another_project() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let first = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();
    service.create_project(m1.id, &new_project(&team, &[])).unwrap();

    service.transfer_manager(owner.id, first.id, w1.id).unwrap();
    assert!(has_label(&conn, &m1, RoleLabel::ProjectManager));
}

#[test]
fn manager_transfer_preconditions() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let outsider = principal(&conn, "outsider");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let project = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();

    let err = service
        .transfer_manager(owner.id, project.id, outsider.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotEligible(_)));

    let err = service
        .transfer_manager(owner.id, project.id, m1.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NoOpTransfer(id) if id == m1.id));

    // The manager may not hand the slot over; only team owner or admin.
    let err = service
        .transfer_manager(m1.id, project.id, w1.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn second_manager_edge_is_a_role_conflict() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let project = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();

    let err = service
        .add_worker(owner.id, project.id, w1.id, WorkerRole::ProjectManager)
        .unwrap_err();
    assert!(matches!(err, ServiceError::RoleConflict(_)));
}

#[test]
fn removing_the_manager_is_rejected() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let project = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();

    let err = service
        .remove_workers(owner.id, project.id, &[m1.id])
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvariantViolation(_)));
}

#[test]
fn worker_removal_reconciles_member_label() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let service = project_service(&conn);
    let project = service
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();
    assert!(has_label(&conn, &w1, RoleLabel::Member));

    service.remove_workers(m1.id, project.id, &[w1.id]).unwrap();
    // w1 works nowhere else, so the member label is revoked.
    assert!(!has_label(&conn, &w1, RoleLabel::Member));
}

#[test]
fn worker_removal_leaves_assignments_dangling() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let m1 = principal(&conn, "mara");
    let w1 = principal(&conn, "wade");
    let team = team_with_members(&conn, &owner, &[&m1, &w1]);

    let projects = project_service(&conn);
    let project = projects
        .create_project(m1.id, &new_project(&team, &[&w1]))
        .unwrap();

    let tasks = task_service(&conn);
    let (task, _event) = tasks
        .create_task(
            m1.id,
            &NewTask {
                project_id: project.id,
                name: "ship".to_string(),
                description: String::new(),
                status: None,
                priority: None,
                due_date_ms: None,
                assignee_id: w1.id,
            },
        )
        .unwrap();

    projects.remove_workers(m1.id, project.id, &[w1.id]).unwrap();

    // The assignment is flagged, never auto-reassigned.
    let task = tasks.show_task(m1.id, task.id).unwrap();
    assert_eq!(task.assignee_id, w1.id);
}

#[test]
fn project_creation_requires_team_membership() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let outsider = principal(&conn, "outsider");
    let team = team_with_members(&conn, &owner, &[]);

    let service = project_service(&conn);
    let err = service
        .create_project(outsider.id, &new_project(&team, &[]))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}
