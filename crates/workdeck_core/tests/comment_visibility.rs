use rusqlite::Connection;
use workdeck_core::db::open_db_in_memory;
use workdeck_core::{
    CommentParent, CommentService, DirectoryRepository, MemoryCache, NewProject, NewTask,
    Principal, Project, ProjectService, RoleLabel, ServiceError, SqliteCommentRepository,
    SqliteDirectoryRepository, SqliteProjectRepository, SqliteTaskRepository,
    SqliteTeamRepository, TaskService, TeamService,
};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn principal(conn: &Connection, name: &str) -> Principal {
    SqliteDirectoryRepository::new(conn)
        .create_principal(name, &format!("{name}@example.com"))
        .unwrap()
}

fn comment_service(
    conn: &Connection,
) -> CommentService<SqliteCommentRepository<'_>, SqliteDirectoryRepository<'_>, MemoryCache> {
    CommentService::new(
        SqliteCommentRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    )
}

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

#[test]
fn commenting_requires_parent_permission() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let stranger = principal(&conn, "sly");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = comment_service(&conn);

    // Workers and the team owner may comment on the project.
    service
        .create_comment(manager.id, CommentParent::Project(project.id), "hello")
        .unwrap();
    service
        .create_comment(owner.id, CommentParent::Project(project.id), "welcome")
        .unwrap();

    let err = service
        .create_comment(stranger.id, CommentParent::Project(project.id), "hi")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn task_comment_permission_follows_task_rules() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    let project = seed_project(&conn, &owner, &manager, &[&alma, &bo]);

    let tasks = TaskService::new(
        SqliteTaskRepository::new(&conn),
        SqliteDirectoryRepository::new(&conn),
        MemoryCache::new(),
    );
    let (task, _event) = tasks
        .create_task(
            manager.id,
            &NewTask {
                project_id: project.id,
                name: "ship".to_string(),
                description: String::new(),
                status: None,
                priority: None,
                due_date_ms: None,
                assignee_id: alma.id,
            },
        )
        .unwrap();

    let service = comment_service(&conn);
    service
        .create_comment(alma.id, CommentParent::Task(task.id), "on it")
        .unwrap();
    service
        .create_comment(manager.id, CommentParent::Task(task.id), "thanks")
        .unwrap();

    // A fellow worker who is neither manager nor assignee cannot comment.
    let err = service
        .create_comment(bo.id, CommentParent::Task(task.id), "me too")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn visibility_listing_is_scoped_per_role() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let stranger = principal(&conn, "sly");
    let project = seed_project(&conn, &owner, &manager, &[&alma]);

    let service = comment_service(&conn);
    service
        .create_comment(manager.id, CommentParent::Project(project.id), "status")
        .unwrap();

    // Worker, manager and team owner all see the project comment.
    assert_eq!(service.list_comments(alma.id).unwrap().len(), 1);
    assert_eq!(service.list_comments(manager.id).unwrap().len(), 1);
    assert_eq!(service.list_comments(owner.id).unwrap().len(), 1);
    assert!(service.list_comments(stranger.id).unwrap().is_empty());

    let admin = principal(&conn, "root");
    SqliteDirectoryRepository::new(&conn)
        .grant_label(admin.id, RoleLabel::Admin)
        .unwrap();
    assert_eq!(service.list_comments(admin.id).unwrap().len(), 1);
}

#[test]
fn comment_update_is_author_only_and_sanitized() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let project = seed_project(&conn, &owner, &manager, &[&alma]);

    let service = comment_service(&conn);
    let (comment, _event) = service
        .create_comment(alma.id, CommentParent::Project(project.id), "draft")
        .unwrap();

    let err = service
        .update_comment(manager.id, comment.id, "hijack")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let updated = service
        .update_comment(alma.id, comment.id, "final <i>version</i>")
        .unwrap();
    assert_eq!(updated.body, "final version");
}

#[test]
fn deleting_a_comment_cascades_its_attachments() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let service = comment_service(&conn);
    let (comment, _event) = service
        .create_comment(manager.id, CommentParent::Project(project.id), "with file")
        .unwrap();

    conn.execute(
        "INSERT INTO attachments (id, parent_kind, parent_id, path, file_name, file_size, mime_type)
         VALUES ('a1', 'comment', ?1, 'files_comments/xnotes.txt', 'notes.txt', 2, 'text/plain');",
        [comment.id.to_string()],
    )
    .unwrap();

    let orphaned = service.delete_comment(manager.id, comment.id).unwrap();
    assert_eq!(orphaned, vec!["files_comments/xnotes.txt".to_string()]);
}
