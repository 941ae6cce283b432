use rusqlite::Connection;
use std::cell::RefCell;
use workdeck_core::db::open_db_in_memory;
use workdeck_core::{
    CommentParent, CommentService, DirectoryRepository, EventDispatcher, MailTemplate, Mailer,
    MailerError, MemoryCache, NewProject, NewTask, Notification, NotificationId,
    NotificationRepository, NotificationService, Principal, Project, ProjectService, RoleLabel,
    ServiceError, SqliteCommentRepository, SqliteDirectoryRepository, SqliteNotificationRepository,
    SqliteProjectRepository, SqliteTaskRepository, SqliteTeamRepository, TaskService, TeamService,
};

#[derive(Default)]
struct RecordingMailer {
    scheduled: RefCell<Vec<(String, MailTemplate, NotificationId)>>,
}

impl Mailer for RecordingMailer {
    fn schedule(
        &self,
        recipient_email: &str,
        template: MailTemplate,
        notification: &Notification,
    ) -> Result<(), MailerError> {
        self.scheduled
            .borrow_mut()
            .push((recipient_email.to_string(), template, notification.id));
        Ok(())
    }
}

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

fn comment_service(
    conn: &Connection,
) -> CommentService<SqliteCommentRepository<'_>, SqliteDirectoryRepository<'_>, MemoryCache> {
    CommentService::new(
        SqliteCommentRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    )
}

/// Team owner `owner`; project managed by `manager` with extra workers.
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
        name: "ship".to_string(),
        description: String::new(),
        status: None,
        priority: None,
        due_date_ms: Some(99_000),
        assignee_id: assignee.id,
    }
}

#[test]
fn task_assignment_confirms_the_assignee_with_a_read_notification() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let (task, event) = task_service(&conn)
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();

    let mailer = RecordingMailer::default();
    let created = EventDispatcher::new(&conn, &mailer).dispatch(&event).unwrap();
    assert_eq!(created.len(), 1);

    let repo = SqliteNotificationRepository::new(&conn);
    let notification = repo.get_notification(created[0]).unwrap().unwrap();
    assert_eq!(notification.recipient_id, manager.id);
    // A confirmation, not an alert: born read.
    assert!(!notification.is_unread());
    assert_eq!(notification.payload.entity_id, task.id);
    assert_eq!(notification.payload.name, "Ship");
    assert_eq!(notification.payload.deadline_ms, Some(99_000));
    assert_eq!(notification.payload.parent_name, "Deck");

    let scheduled = mailer.scheduled.borrow();
    assert_eq!(scheduled.len(), 1);
    let (email, template, notification_id) = &scheduled[0];
    assert_eq!(email, "mara@example.com");
    assert_eq!(*template, MailTemplate::TaskAssigned);
    // The outbound message references the already-created notification.
    assert_eq!(*notification_id, created[0]);
}

#[test]
fn comment_on_task_fans_out_to_assignee_workers_and_owner_once_each() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    // Workers are {alma (manager), bo}; task assigned to alma.
    let project = seed_project(&conn, &owner, &alma, &[&bo]);
    let (task, _event) = task_service(&conn)
        .create_task(alma.id, &new_task(&project, &alma))
        .unwrap();

    let (_comment, event) = comment_service(&conn)
        .create_comment(alma.id, CommentParent::Task(task.id), "on it")
        .unwrap();

    let mailer = RecordingMailer::default();
    let created = EventDispatcher::new(&conn, &mailer).dispatch(&event).unwrap();

    let repo = SqliteNotificationRepository::new(&conn);
    let mut recipients: Vec<_> = created
        .iter()
        .map(|id| repo.get_notification(*id).unwrap().unwrap())
        .collect();
    assert_eq!(recipients.len(), 3, "recipient set must be deduplicated");
    for notification in &recipients {
        assert!(notification.is_unread());
        assert_eq!(notification.payload.entity_id, task.id);
    }

    recipients.sort_by_key(|notification| notification.recipient_id);
    let mut expected = vec![alma.id, bo.id, owner.id];
    expected.sort();
    let actual: Vec<_> = recipients
        .iter()
        .map(|notification| notification.recipient_id)
        .collect();
    assert_eq!(actual, expected);

    // One outbound message per recipient, in creation order.
    let scheduled = mailer.scheduled.borrow();
    let scheduled_ids: Vec<_> = scheduled.iter().map(|(_, _, id)| *id).collect();
    assert_eq!(scheduled_ids, created);
}

#[test]
fn comment_on_project_reaches_creator_workers_and_owner() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let alma = principal(&conn, "alma");
    let bo = principal(&conn, "bo");
    let project = seed_project(&conn, &owner, &alma, &[&bo]);

    let (_comment, event) = comment_service(&conn)
        .create_comment(bo.id, CommentParent::Project(project.id), "kickoff notes")
        .unwrap();

    let mailer = RecordingMailer::default();
    let created = EventDispatcher::new(&conn, &mailer).dispatch(&event).unwrap();
    assert_eq!(created.len(), 3);

    let repo = SqliteNotificationRepository::new(&conn);
    let payload = repo
        .get_notification(created[0])
        .unwrap()
        .unwrap()
        .payload;
    assert_eq!(payload.entity_kind, "project");
    assert_eq!(payload.parent_name, "Crew");
}

#[test]
fn reassignment_raises_a_second_event_without_touching_the_first() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let alma = principal(&conn, "alma");
    let project = seed_project(&conn, &owner, &manager, &[&alma]);

    let service = task_service(&conn);
    let mailer = RecordingMailer::default();
    let dispatcher = EventDispatcher::new(&conn, &mailer);

    let (task, first_event) = service
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();
    let first = dispatcher.dispatch(&first_event).unwrap();

    let (_task, second_event) = service.assign_task(manager.id, task.id, alma.id).unwrap();
    let second = dispatcher.dispatch(&second_event).unwrap();

    let repo = SqliteNotificationRepository::new(&conn);
    let first_notification = repo.get_notification(first[0]).unwrap().unwrap();
    let second_notification = repo.get_notification(second[0]).unwrap().unwrap();
    assert_eq!(first_notification.recipient_id, manager.id);
    assert_eq!(second_notification.recipient_id, alma.id);
    assert_eq!(repo.list_notifications().unwrap().len(), 2);
}

#[test]
fn redispatching_the_same_event_duplicates_notifications() {
    // At-least-once without a dedup key: retries create duplicates.
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let (_task, event) = task_service(&conn)
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();

    let mailer = RecordingMailer::default();
    let dispatcher = EventDispatcher::new(&conn, &mailer);
    dispatcher.dispatch(&event).unwrap();
    dispatcher.dispatch(&event).unwrap();

    let repo = SqliteNotificationRepository::new(&conn);
    assert_eq!(repo.list_notifications().unwrap().len(), 2);
}

#[test]
fn notifications_are_scoped_to_recipient_and_admin() {
    let conn = setup();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let stranger = principal(&conn, "sly");
    let project = seed_project(&conn, &owner, &manager, &[]);

    let (_task, event) = task_service(&conn)
        .create_task(manager.id, &new_task(&project, &manager))
        .unwrap();
    let mailer = RecordingMailer::default();
    let created = EventDispatcher::new(&conn, &mailer).dispatch(&event).unwrap();

    let service = NotificationService::new(
        SqliteNotificationRepository::new(&conn),
        SqliteDirectoryRepository::new(&conn),
        MemoryCache::new(),
    );

    assert_eq!(service.list_notifications(manager.id).unwrap().len(), 1);
    assert!(service.list_notifications(stranger.id).unwrap().is_empty());

    let err = service.mark_read(stranger.id, created[0]).unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let marked = service.mark_read(manager.id, created[0]).unwrap();
    assert!(!marked.is_unread());

    let admin = principal(&conn, "root");
    SqliteDirectoryRepository::new(&conn)
        .grant_label(admin.id, RoleLabel::Admin)
        .unwrap();
    assert_eq!(service.list_notifications(admin.id).unwrap().len(), 1);

    service.delete_notification(manager.id, created[0]).unwrap();
    assert!(service.list_notifications(manager.id).unwrap().is_empty());
}
