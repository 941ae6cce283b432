use rusqlite::Connection;
use workdeck_core::db::open_db_in_memory;
use workdeck_core::{
    AttachmentParent, AttachmentService, BlobStore, DirectoryRepository, FsBlobStore,
    MemoryCache, NewProject, Principal, Project, ProjectService, ServiceError,
    SqliteAttachmentRepository, SqliteDirectoryRepository, SqliteProjectRepository,
    SqliteTeamRepository, TeamService, Upload,
};

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn principal(conn: &Connection, name: &str) -> Principal {
    SqliteDirectoryRepository::new(conn)
        .create_principal(name, &format!("{name}@example.com"))
        .unwrap()
}

fn attachment_service<'conn>(
    conn: &'conn Connection,
    root: &std::path::Path,
) -> AttachmentService<
    SqliteAttachmentRepository<'conn>,
    SqliteDirectoryRepository<'conn>,
    MemoryCache,
    FsBlobStore,
> {
    AttachmentService::new(
        SqliteAttachmentRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
        FsBlobStore::new(root),
    )
}

fn seed_project(conn: &Connection, owner: &Principal, manager: &Principal) -> Project {
    let teams = TeamService::new(
        SqliteTeamRepository::new(conn),
        SqliteDirectoryRepository::new(conn),
        MemoryCache::new(),
    );
    let team = teams.create_team(owner.id, "crew", &[manager.id]).unwrap();

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
                worker_ids: Vec::new(),
            },
        )
        .unwrap()
}

fn upload(name: &str, bytes: &[u8]) -> Upload {
    Upload {
        bytes: bytes.to_vec(),
        file_name: name.to_string(),
        mime_type: "application/octet-stream".to_string(),
    }
}

#[test]
fn attachment_lifecycle_stores_replaces_and_deletes_blobs() {
    let conn = setup();
    let dir = tempfile::tempdir().unwrap();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager);

    let service = attachment_service(&conn, dir.path());
    let blobs = FsBlobStore::new(dir.path());

    let attachment = service
        .create_attachment(
            manager.id,
            AttachmentParent::Project(project.id),
            &upload("spec.pdf", b"v1"),
        )
        .unwrap();
    assert!(attachment.path.starts_with("files_projects/"));
    assert_eq!(attachment.file_size, 2);
    assert!(blobs.exists(&attachment.path));

    let replaced = service
        .replace_attachment(manager.id, attachment.id, &upload("spec.pdf", b"v2!"))
        .unwrap();
    assert_ne!(replaced.path, attachment.path);
    assert_eq!(replaced.file_size, 3);
    assert!(blobs.exists(&replaced.path));
    // The previous blob is gone.
    assert!(!blobs.exists(&attachment.path));

    service.delete_attachment(manager.id, replaced.id).unwrap();
    assert!(!blobs.exists(&replaced.path));
}

#[test]
fn attaching_requires_parent_permission() {
    let conn = setup();
    let dir = tempfile::tempdir().unwrap();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let stranger = principal(&conn, "sly");
    let project = seed_project(&conn, &owner, &manager);

    let service = attachment_service(&conn, dir.path());
    let err = service
        .create_attachment(
            stranger.id,
            AttachmentParent::Project(project.id),
            &upload("sneak.txt", b"x"),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[test]
fn attachment_listing_is_scoped_to_reachable_parents() {
    let conn = setup();
    let dir = tempfile::tempdir().unwrap();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let stranger = principal(&conn, "sly");
    let project = seed_project(&conn, &owner, &manager);

    let service = attachment_service(&conn, dir.path());
    service
        .create_attachment(
            manager.id,
            AttachmentParent::Project(project.id),
            &upload("spec.pdf", b"v1"),
        )
        .unwrap();

    assert_eq!(service.list_attachments(manager.id).unwrap().len(), 1);
    assert_eq!(service.list_attachments(owner.id).unwrap().len(), 1);
    assert!(service.list_attachments(stranger.id).unwrap().is_empty());
}

#[test]
fn project_delete_reports_orphaned_blob_paths() {
    let conn = setup();
    let dir = tempfile::tempdir().unwrap();
    let owner = principal(&conn, "owner");
    let manager = principal(&conn, "mara");
    let project = seed_project(&conn, &owner, &manager);

    let attachments = attachment_service(&conn, dir.path());
    let attachment = attachments
        .create_attachment(
            manager.id,
            AttachmentParent::Project(project.id),
            &upload("spec.pdf", b"v1"),
        )
        .unwrap();

    let projects = ProjectService::new(
        SqliteProjectRepository::new(&conn),
        SqliteDirectoryRepository::new(&conn),
        MemoryCache::new(),
    );
    let orphaned = projects.delete_project(manager.id, project.id).unwrap();
    assert_eq!(orphaned, vec![attachment.path.clone()]);

    // The caller clears the reported paths from the blob store.
    let blobs = FsBlobStore::new(dir.path());
    for path in &orphaned {
        blobs.delete(path).unwrap();
    }
    assert!(!blobs.exists(&attachment.path));
}
