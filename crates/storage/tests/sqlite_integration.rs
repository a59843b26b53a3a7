use chrono::Duration;
use mentor_core::model::{
    MeetingSlot, MeetingTool, MeetingUrl, MessageBody, NewMessage, RegistrationDraft,
    SessionTemplateDraft, TemplateId, TestKind, TestResult, UserId,
};
use mentor_core::policy::CompletionStampPolicy;
use mentor_core::time::fixed_now;
use storage::repository::{
    CurriculumRepository, MessageRepository, ProfileRepository, StorageError, UserRepository,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

async fn register(repo: &SqliteRepository, email: &str, username: &str, mentor: bool) -> UserId {
    let registration = RegistrationDraft {
        email: email.into(),
        is_mentor: mentor,
        ..RegistrationDraft::default()
    }
    .validate()
    .unwrap();
    repo.create_user(&registration, username, fixed_now())
        .await
        .expect("create user")
        .id()
}

fn draft(title: &str, order: u32) -> SessionTemplateDraft {
    SessionTemplateDraft {
        title: title.into(),
        content_markdown: "# Tasks".into(),
        mentor_content_markdown: "Ask about the homework".into(),
        order,
    }
}

#[tokio::test]
async fn user_and_profile_are_created_together() {
    let repo = repo("memdb_users").await;
    let id = register(&repo, "Mentor@Example.com", "mentor", true).await;

    let profile = repo.get_profile(id).await.unwrap().expect("profile row");
    assert!(profile.is_mentor());
    assert!(!profile.intro_test().done);

    let found = repo.find_by_email("mentor@example.COM").await.unwrap();
    assert_eq!(found.map(|u| u.id()), Some(id));

    let registration = RegistrationDraft {
        email: "MENTOR@example.com".into(),
        ..RegistrationDraft::default()
    }
    .validate()
    .unwrap();
    let err = repo
        .create_user(&registration, "other", fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));
    assert_eq!(repo.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn profile_column_updates_round_trip() {
    let repo = repo("memdb_profiles").await;
    let mentor = register(&repo, "m@example.com", "m", true).await;
    let learner = register(&repo, "l@example.com", "l", false).await;

    repo.set_assigned_mentor(learner, Some(mentor), fixed_now())
        .await
        .unwrap();
    let slot = MeetingSlot {
        scheduled_at: Some(fixed_now() + Duration::days(2)),
        url: Some(MeetingUrl::parse("https://meet.example.com/abc").unwrap()),
        tool: Some(MeetingTool::Meet),
        notes: "bring questions".into(),
    };
    repo.set_next_meeting(learner, &slot, fixed_now()).await.unwrap();
    repo.record_test(
        learner,
        TestKind::Intro,
        &TestResult {
            score: 14,
            total: 20,
            taken_at: fixed_now(),
        },
    )
    .await
    .unwrap();

    let profile = repo.get_profile(learner).await.unwrap().unwrap();
    assert_eq!(profile.assigned_mentor(), Some(mentor));
    assert_eq!(profile.next_meeting(), &slot);
    assert_eq!(profile.intro_test().score, Some(14));
    assert!(profile.intro_test().done);

    assert!(!repo
        .clear_assigned_mentor_if(learner, learner, fixed_now())
        .await
        .unwrap());
    assert!(repo
        .clear_assigned_mentor_if(learner, mentor, fixed_now())
        .await
        .unwrap());
    let profile = repo.get_profile(learner).await.unwrap().unwrap();
    assert_eq!(profile.assigned_mentor(), None);

    let missing = repo
        .set_assigned_mentor(UserId::new(999), Some(mentor), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound));
}

#[tokio::test]
async fn completion_upsert_keeps_single_row_and_first_timestamp() {
    let repo = repo("memdb_completions").await;
    let learner = register(&repo, "l@example.com", "l", false).await;
    let template = repo.insert_template(draft("Intro", 0), fixed_now()).await.unwrap();

    let first = repo
        .set_completion(
            learner,
            template.id(),
            true,
            fixed_now(),
            CompletionStampPolicy::PreserveFirst,
        )
        .await
        .unwrap();
    let again = repo
        .set_completion(
            learner,
            template.id(),
            true,
            fixed_now() + Duration::hours(3),
            CompletionStampPolicy::PreserveFirst,
        )
        .await
        .unwrap();
    assert_eq!(first.completed_at, again.completed_at);

    let restamped = repo
        .set_completion(
            learner,
            template.id(),
            true,
            fixed_now() + Duration::hours(5),
            CompletionStampPolicy::Restamp,
        )
        .await
        .unwrap();
    assert_eq!(restamped.completed_at, Some(fixed_now() + Duration::hours(5)));

    let undone = repo
        .set_completion(
            learner,
            template.id(),
            false,
            fixed_now(),
            CompletionStampPolicy::PreserveFirst,
        )
        .await
        .unwrap();
    assert!(!undone.completed);
    assert_eq!(undone.completed_at, None);

    assert_eq!(repo.completions_for_user(learner).await.unwrap().len(), 1);
    assert_eq!(repo.count_completed(learner).await.unwrap(), 0);
}

#[tokio::test]
async fn templates_list_in_display_order() {
    let repo = repo("memdb_templates").await;
    repo.insert_template(draft("Second", 2), fixed_now()).await.unwrap();
    repo.insert_template(draft("First", 1), fixed_now()).await.unwrap();
    repo.insert_template(draft("First, newer", 1), fixed_now() + Duration::hours(1))
        .await
        .unwrap();

    let titles: Vec<String> = repo
        .list_templates()
        .await
        .unwrap()
        .iter()
        .map(|t| t.title().to_owned())
        .collect();
    assert_eq!(titles, vec!["First, newer", "First", "Second"]);
    assert_eq!(repo.count_templates().await.unwrap(), 3);
    assert!(repo.get_template(TemplateId::new(42)).await.unwrap().is_none());

    let err = repo
        .insert_template(draft("   ", 0), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[tokio::test]
async fn reset_progress_clears_flags_but_keeps_rows() {
    let repo = repo("memdb_reset").await;
    let learner = register(&repo, "l@example.com", "l", false).await;
    let t1 = repo.insert_template(draft("One", 0), fixed_now()).await.unwrap();
    let t2 = repo.insert_template(draft("Two", 1), fixed_now()).await.unwrap();
    for t in [&t1, &t2] {
        repo.set_completion(learner, t.id(), true, fixed_now(), CompletionStampPolicy::PreserveFirst)
            .await
            .unwrap();
    }
    repo.record_test(
        learner,
        TestKind::Exit,
        &TestResult {
            score: 18,
            total: 20,
            taken_at: fixed_now(),
        },
    )
    .await
    .unwrap();

    repo.reset_progress(learner, fixed_now()).await.unwrap();

    let profile = repo.get_profile(learner).await.unwrap().unwrap();
    assert!(!profile.end_test().done);
    assert_eq!(profile.end_test().score, None);
    let rows = repo.completions_for_user(learner).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|c| !c.completed && c.completed_at.is_none()));
}

#[tokio::test]
async fn thread_is_chronological_and_read_marking_is_directional() {
    let repo = repo("memdb_messages").await;
    let mentor = register(&repo, "m@example.com", "m", true).await;
    let learner = register(&repo, "l@example.com", "l", false).await;

    for (i, (from, to)) in [(learner, mentor), (mentor, learner), (learner, mentor)]
        .into_iter()
        .enumerate()
    {
        let at = fixed_now() + Duration::minutes(i64::try_from(i).unwrap());
        repo.insert_message(
            NewMessage::new(from, to, MessageBody::parse(&format!("msg {i}")).unwrap(), at)
                .unwrap(),
        )
        .await
        .unwrap();
    }

    let thread = repo.thread(mentor, learner).await.unwrap();
    let bodies: Vec<&str> = thread.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["msg 0", "msg 1", "msg 2"]);

    assert_eq!(repo.unread_count(mentor).await.unwrap(), 2);
    let changed = repo.mark_thread_read(mentor, learner, fixed_now()).await.unwrap();
    assert_eq!(changed, 2);
    assert_eq!(repo.unread_count(mentor).await.unwrap(), 0);
    assert_eq!(repo.unread_count(learner).await.unwrap(), 1);

    let newest_first = repo.messages_for(learner).await.unwrap();
    assert_eq!(newest_first[0].body, "msg 2");
}

#[tokio::test]
async fn concurrent_toggles_share_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display());
    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    let learner = register(&repo, "l@example.com", "l", false).await;
    let template = repo.insert_template(draft("Race", 0), fixed_now()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let repo = repo.clone();
        let id = template.id();
        handles.push(tokio::spawn(async move {
            repo.set_completion(
                learner,
                id,
                i % 3 != 0,
                fixed_now() + Duration::seconds(i),
                CompletionStampPolicy::PreserveFirst,
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rows = repo.completions_for_user(learner).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].completed, rows[0].completed_at.is_some());
}
