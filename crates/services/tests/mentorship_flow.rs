use std::collections::HashSet;
use std::sync::Arc;

use mentor_core::model::{RegistrationDraft, SessionTemplateDraft, TemplateId, UserId};
use mentor_core::policy::Policies;
use mentor_core::time::fixed_now;
use services::{AppConfig, AppServices, Clock, ForbiddenReason, MeetingRequest, ServiceError};

async fn register(app: &AppServices, email: &str, mentor: bool) -> UserId {
    app.accounts()
        .register(RegistrationDraft {
            email: email.into(),
            is_mentor: mentor,
            ..RegistrationDraft::default()
        })
        .await
        .expect("register")
        .id()
}

async fn seed(app: &AppServices, titles: &[&str]) -> Vec<TemplateId> {
    let mut ids = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        let template = app
            .progress()
            .add_template(SessionTemplateDraft {
                title: (*title).into(),
                content_markdown: format!("## {title}"),
                mentor_content_markdown: "Mentor notes".into(),
                order: u32::try_from(i).unwrap(),
            })
            .await
            .expect("template");
        ids.push(template.id());
    }
    ids
}

async fn full_journey(app: AppServices) {
    let mentor = register(&app, "mentor@example.com", true).await;
    let learner = register(&app, "learner@example.com", false).await;
    let templates = seed(&app, &["Introductions", "Daily routine", "Travel"]).await;

    // placement test
    let intro = app.testing().intro_test_questions(learner).await.unwrap();
    let answers: Vec<Option<String>> = intro
        .questions
        .iter()
        .map(|q| Some(q.correct_answer.clone()))
        .collect();
    let placed = app
        .testing()
        .submit_intro_test(learner, &answers)
        .await
        .unwrap();
    assert_eq!((placed.score, placed.total), (20, 20));

    // pairing and first meeting
    app.pairing().assign_mentor(mentor, learner).await.unwrap();
    app.pairing()
        .set_next_meeting(
            mentor,
            learner,
            MeetingRequest {
                scheduled_at: Some("2023-11-20T18:00".into()),
                url: Some("https://meet.example.com/abc-defg".into()),
                tool: Some("meet".into()),
                notes: "Bring your notebook".into(),
            },
        )
        .await
        .unwrap();

    // messages both ways
    app.messaging()
        .send_message_to_mentor(learner, "Hello!")
        .await
        .unwrap();
    app.messaging()
        .send_in_thread(mentor, learner, "Welcome aboard")
        .await
        .unwrap();

    // two of three sessions done: exit test stays locked
    for id in &templates[..2] {
        app.progress()
            .toggle_completion(learner, *id, true)
            .await
            .unwrap();
    }
    let locked = app
        .testing()
        .submit_exit_test(learner, &answers)
        .await
        .unwrap_err();
    assert!(matches!(
        locked,
        ServiceError::Forbidden(ForbiddenReason::NotEligible)
    ));

    // mentor ticks the last one in bulk
    let all: HashSet<TemplateId> = templates.iter().copied().collect();
    app.pairing()
        .bulk_set_completions(mentor, learner, &all)
        .await
        .unwrap();

    let dashboard = app.accounts().dashboard(learner).await.unwrap();
    assert!(dashboard.eligible_for_end_test);
    assert_eq!(dashboard.eligibility.completed, 3);
    assert_eq!(dashboard.unread_messages, 1);
    let meeting = dashboard.next_meeting.expect("meeting");
    assert_eq!(meeting.notes(), "Bring your notebook");

    let exit = app.testing().exit_test_questions(learner).await.unwrap();
    let wrong: Vec<Option<String>> = exit.questions.iter().map(|_| None).collect();
    let result = app
        .testing()
        .submit_exit_test(learner, &wrong)
        .await
        .unwrap();
    assert_eq!((result.score, result.total), (0, 20));

    // a new session relocks the exit test until it is done too
    let extra = seed(&app, &["Review"]).await[0];
    let relocked = app.progress().compute_eligibility(learner).await.unwrap();
    assert!(!relocked.eligible_for_end_test());
    assert_eq!(relocked.remaining(), 1);
    let denied = app
        .testing()
        .exit_test_questions(learner)
        .await
        .unwrap_err();
    assert!(matches!(
        denied,
        ServiceError::Forbidden(ForbiddenReason::NotEligible)
    ));
    app.progress()
        .toggle_completion(learner, extra, true)
        .await
        .unwrap();
    assert!(
        app.progress()
            .compute_eligibility(learner)
            .await
            .unwrap()
            .eligible_for_end_test()
    );

    // mentor sees the learner finished
    let mentor_view = app.pairing().mentor_dashboard(mentor).await.unwrap();
    assert_eq!(mentor_view.mentees.len(), 1);
    assert!(mentor_view.mentees[0].end_test.done);

    // reading the thread clears the mentor's unread count
    let thread = app.messaging().open_thread(mentor, learner).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(app.messaging().unread_count(mentor).await.unwrap(), 0);

    // starting over keeps the mentor and the rows
    app.progress().reset_progress(learner).await.unwrap();
    let after = app.accounts().dashboard(learner).await.unwrap();
    assert!(!after.intro_test.done && !after.end_test.done);
    assert_eq!(after.eligibility.completed, 0);
    assert_eq!(after.assigned_mentor, Some(mentor));
    assert!(after.next_meeting.is_none());
    let sessions = app.progress().session_list(learner).await.unwrap();
    assert_eq!(sessions.len(), 4);
    assert!(sessions.iter().all(|s| !s.completed));
}

#[tokio::test]
async fn journey_in_memory() {
    let app = AppServices::in_memory(Clock::Fixed(fixed_now()), Policies::default()).unwrap();
    full_journey(app).await;
}

#[tokio::test]
async fn journey_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        db_url: format!("sqlite://{}?mode=rwc", dir.path().join("mentor.db").display()),
        ..AppConfig::default()
    };
    let app = AppServices::from_config(&config, Clock::Fixed(fixed_now()))
        .await
        .unwrap();
    full_journey(app).await;
}

#[tokio::test]
async fn concurrent_assignment_picks_one_mentor() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        db_url: format!("sqlite://{}?mode=rwc", dir.path().join("race.db").display()),
        ..AppConfig::default()
    };
    let app = AppServices::from_config(&config, Clock::Fixed(fixed_now()))
        .await
        .unwrap();
    let first = register(&app, "first@example.com", true).await;
    let second = register(&app, "second@example.com", true).await;
    let learner = register(&app, "learner@example.com", false).await;

    let pairing = app.pairing();
    let a = {
        let pairing = Arc::clone(&pairing);
        tokio::spawn(async move { pairing.assign_mentor(first, learner).await })
    };
    let b = {
        let pairing = Arc::clone(&pairing);
        tokio::spawn(async move { pairing.assign_mentor(second, learner).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let profile = app.accounts().profile(learner).await.unwrap();
    let winner = profile.assigned_mentor().expect("assigned");
    assert!(winner == first || winner == second);
}

#[tokio::test]
async fn concurrent_toggles_leave_one_record() {
    let app = AppServices::in_memory(Clock::Fixed(fixed_now()), Policies::default()).unwrap();
    let learner = register(&app, "learner@example.com", false).await;
    let template = seed(&app, &["Only"]).await[0];

    let mut handles = Vec::new();
    for i in 0..8 {
        let progress = app.progress();
        handles.push(tokio::spawn(async move {
            progress.toggle_completion(learner, template, i % 2 == 0).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let sessions = app.progress().session_list(learner).await.unwrap();
    assert_eq!(sessions.len(), 1);
    let detail = app.progress().session_detail(learner, template).await.unwrap();
    let record = detail.completion.expect("record created");
    assert_eq!(record.completed, record.completed_at.is_some());
}

#[tokio::test]
async fn learners_cannot_act_as_mentors() {
    let app = AppServices::in_memory(Clock::Fixed(fixed_now()), Policies::default()).unwrap();
    let learner = register(&app, "learner@example.com", false).await;
    let other = register(&app, "other@example.com", false).await;

    let err = app.pairing().assign_mentor(learner, other).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Forbidden(ForbiddenReason::NotAMentor)
    ));
    let err = app
        .pairing()
        .unassign_mentor(learner, other)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    let profile = app.accounts().profile(other).await.unwrap();
    assert_eq!(profile.assigned_mentor(), None);
}
