//! End-to-end relay scenarios against a scripted completion port.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use xtl_core::ports::testing::{RecordingEmitter, Scripted, ScriptedCompletions};
use xtl_core::{
    CompletionError, MessageRole, RelayConfig, RelayEngine, RelayError, RelayEvent, RelayServices,
    RetryPolicy, TokenUsage, client_key,
};

const CLIENT: &str = "127.0.0.1";

fn base_config() -> RelayConfig {
    RelayConfig {
        api_keys: "sk-test".to_string(),
        pre_prompt: String::new(),
        ..RelayConfig::with_defaults()
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        delay: Duration::ZERO,
        request_timeout: Duration::from_millis(50),
    }
}

fn engine(config: RelayConfig, fake: &ScriptedCompletions) -> (RelayEngine, RecordingEmitter) {
    engine_with_policy(config, fake, fast_policy())
}

fn engine_with_policy(
    config: RelayConfig,
    fake: &ScriptedCompletions,
    policy: RetryPolicy,
) -> (RelayEngine, RecordingEmitter) {
    let events = RecordingEmitter::new();
    let services = RelayServices::new(config.max_clients);
    let engine = RelayEngine::new(
        config,
        services,
        Arc::new(fake.clone()),
        Arc::new(events.clone()),
    )
    .with_policy(policy);
    (engine, events)
}

/// Paused-clock elapsed time, allowing for timer tick rounding.
fn assert_elapsed(started: tokio::time::Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(20),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

fn context_len(engine: &RelayEngine) -> usize {
    engine
        .services()
        .context
        .get(&client_key(CLIENT))
        .map_or(0, |ctx| ctx.len())
}

#[tokio::test]
async fn test_hello_round_trip_updates_context() {
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let (engine, events) = engine(base_config(), &fake);

    let result = engine.translate("hello", CLIENT).await;
    assert_eq!(result.as_deref(), Ok("你好"));
    assert_eq!(fake.calls(), 1);

    let ctx = engine.services().context.get(&client_key(CLIENT)).unwrap();
    let turns: Vec<_> = ctx
        .turns()
        .map(|t| (t.request.as_str(), t.response.as_str()))
        .collect();
    assert_eq!(turns, vec![("hello", "你好")]);

    let request = fake.last_request().unwrap();
    assert_eq!(request.credential, "sk-test");
    assert_eq!(request.model, "gpt-3.5-turbo");
    assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[1].content, "hello");

    assert_eq!(events.names(), vec!["request_received", "translated"]);
}

#[tokio::test]
async fn test_success_on_third_attempt() {
    let fake = ScriptedCompletions::new(
        [
            Scripted::Fail(CompletionError::Transport {
                status: Some(503),
                message: "overloaded".to_string(),
            }),
            Scripted::reply("Error: model unavailable"),
        ],
        Scripted::reply("你好"),
    );
    let (engine, events) = engine(base_config(), &fake);

    assert_eq!(engine.translate("hello", CLIENT).await.as_deref(), Ok("你好"));
    assert_eq!(fake.calls(), 3);
    assert_eq!(context_len(&engine), 1);

    let retries = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, RelayEvent::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn test_always_invalid_exhausts_five_attempts() {
    let fake = ScriptedCompletions::always(Scripted::reply("翻译失败"));
    let (engine, events) = engine(base_config(), &fake);

    let result = engine.translate("hello", CLIENT).await;
    assert_eq!(result, Err(RelayError::RetriesExhausted { attempts: 5 }));
    assert_eq!(fake.calls(), 5);
    assert_eq!(context_len(&engine), 0);
    assert_eq!(events.names().last(), Some(&"request_failed"));
}

#[tokio::test]
async fn test_all_timeouts_leave_context_unchanged() {
    let fake = ScriptedCompletions::always(Scripted::Stall(Duration::from_secs(5)));
    let (engine, events) = engine(base_config(), &fake);

    let result = engine.translate("hello", CLIENT).await;
    assert_eq!(result, Err(RelayError::RetriesExhausted { attempts: 5 }));
    assert_eq!(fake.calls(), 5);
    assert_eq!(context_len(&engine), 0);

    let timeouts = events
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                RelayEvent::AttemptFailed {
                    kind: xtl_core::AttemptErrorKind::Timeout,
                    ..
                }
            )
        })
        .count();
    assert_eq!(timeouts, 5);
}

#[tokio::test]
async fn test_missing_credential_aborts_without_calling_remote() {
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let config = RelayConfig {
        api_keys: " , ".to_string(),
        ..base_config()
    };
    let (engine, _events) = engine(config, &fake);

    let result = engine.translate("hello", CLIENT).await;
    assert_eq!(result, Err(RelayError::CredentialUnavailable));
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn test_blank_text_short_circuits() {
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let (engine, events) = engine(base_config(), &fake);

    assert_eq!(engine.translate("   ", CLIENT).await.as_deref(), Ok(""));
    assert_eq!(fake.calls(), 0);
    assert!(events.events().is_empty());
}

#[tokio::test]
async fn test_glossary_hint_is_added_to_system_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("_Substitutions.txt");
    fs::write(&path, "Arthur=亚瑟\nMerlin=梅林\n").unwrap();

    let fake = ScriptedCompletions::always(Scripted::reply("亚瑟来了"));
    let config = RelayConfig {
        glossary_enabled: true,
        glossary_path: Some(path),
        extraction_probability: 0.0,
        ..base_config()
    };
    let (engine, events) = engine(config, &fake);

    engine.translate("arthur arrives", CLIENT).await.unwrap();

    let request = fake.last_request().unwrap();
    let system = request.system_message().unwrap();
    assert!(system.contains("【已知术语/Known Terms】:\nArthur = 亚瑟\n"));
    assert!(!system.contains("Merlin"));
    assert!(!system.contains("<tl>"));
    assert!(
        events
            .events()
            .contains(&RelayEvent::TermsMatched { count: 1 })
    );
}

#[tokio::test]
async fn test_extraction_learns_only_terms_present_in_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("_Substitutions.txt");

    let fake = ScriptedCompletions::always(Scripted::reply(
        "<tl> 亚瑟在卡美洛遇见梅林 </tl>\n<tm>Merlin=梅林\nExcalibur=圣剑\nbad line</tm>",
    ));
    let config = RelayConfig {
        glossary_enabled: true,
        glossary_path: Some(path.clone()),
        extraction_probability: 1.0,
        ..base_config()
    };
    let (engine, events) = engine(config, &fake);

    let result = engine.translate("Arthur meets Merlin", CLIENT).await;
    assert_eq!(result.as_deref(), Ok("亚瑟在卡美洛遇见梅林"));

    let system = fake.last_request().unwrap().messages[0].content.clone();
    assert!(system.contains("Put translation in <tl>...</tl> tags."));

    let glossary = &engine.services().glossary;
    assert_eq!(glossary.get("Merlin").as_deref(), Some("梅林"));
    assert!(glossary.get("Excalibur").is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), "Merlin=梅林\n");
    assert!(events.events().contains(&RelayEvent::TermLearned {
        source: "Merlin".to_string(),
        target: "梅林".to_string(),
    }));
}

#[tokio::test]
async fn test_extraction_without_tags_strips_markup() {
    let dir = tempfile::tempdir().unwrap();
    let fake = ScriptedCompletions::always(Scripted::reply("<b>亚瑟</b>出发了"));
    let config = RelayConfig {
        glossary_enabled: true,
        glossary_path: Some(dir.path().join("_Substitutions.txt")),
        extraction_probability: 1.0,
        ..base_config()
    };
    let (engine, events) = engine(config, &fake);

    let result = engine.translate("Arthur sets out", CLIENT).await;
    assert_eq!(result.as_deref(), Ok("亚瑟出发了"));
    assert!(events.names().contains(&"format_warning"));
}

#[tokio::test]
async fn test_short_text_never_uses_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let config = RelayConfig {
        glossary_enabled: true,
        glossary_path: Some(dir.path().join("_Substitutions.txt")),
        extraction_probability: 1.0,
        ..base_config()
    };
    let (engine, _events) = engine(config, &fake);

    engine.translate("hi there", CLIENT).await.unwrap();
    let system = fake.last_request().unwrap().messages[0].content.clone();
    assert!(!system.contains("<tl>"));
}

#[tokio::test]
async fn test_thinking_block_is_stripped() {
    let fake = ScriptedCompletions::always(Scripted::reply("<think>greeting</think>\n你好"));
    let (engine, _events) = engine(base_config(), &fake);

    assert_eq!(engine.translate("hello", CLIENT).await.as_deref(), Ok("你好"));
}

#[tokio::test]
async fn test_context_is_replayed_on_next_request() {
    let fake = ScriptedCompletions::new([Scripted::reply("你好")], Scripted::reply("再见"));
    let config = RelayConfig {
        pre_prompt: "翻译：".to_string(),
        ..base_config()
    };
    let (engine, _events) = engine(config, &fake);

    engine.translate("hello", CLIENT).await.unwrap();
    engine.translate("bye", CLIENT).await.unwrap();

    let messages = fake.last_request().unwrap().messages;
    let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
    assert_eq!(messages[1].content, "翻译：hello");
    assert_eq!(messages[2].content, "你好");
    assert_eq!(messages[3].content, "翻译：bye");

    // Another client has its own, empty history.
    engine.translate("hello", "10.0.0.9").await.unwrap();
    assert_eq!(fake.last_request().unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_context_depth_bounds_replay() {
    let fake = ScriptedCompletions::always(Scripted::reply("好"));
    let config = RelayConfig {
        context_depth: 2,
        ..base_config()
    };
    let (engine, _events) = engine(config, &fake);

    for text in ["one", "two", "three", "four"] {
        engine.translate(text, CLIENT).await.unwrap();
    }
    let messages = fake.last_request().unwrap().messages;
    assert_eq!(messages.len(), 1 + 2 * 2 + 1);
    assert_eq!(messages[1].content, "two");
    assert_eq!(context_len(&engine), 2);
}

#[tokio::test]
async fn test_rule_files_beside_glossary_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("_Preprocessors.txt"), "; comment\nA=B\nB=C\n").unwrap();
    fs::write(dir.path().join("_Postprocessors.txt"), "。$=\n").unwrap();

    let fake = ScriptedCompletions::always(Scripted::reply("丙。"));
    let config = RelayConfig {
        glossary_path: Some(dir.path().join("_Substitutions.txt")),
        ..base_config()
    };
    let (engine, _events) = engine(config, &fake);

    assert_eq!(engine.translate("A", CLIENT).await.as_deref(), Ok("丙"));
    assert_eq!(fake.last_request().unwrap().messages[1].content, "C");
}

#[tokio::test]
async fn test_config_swap_applies_to_next_request() {
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let (engine, _events) = engine(base_config(), &fake);

    engine.translate("hello", CLIENT).await.unwrap();
    engine.apply_config(RelayConfig {
        model: "deepseek-chat".to_string(),
        api_keys: "sk-a,sk-b".to_string(),
        ..base_config()
    });
    engine.translate("hello", CLIENT).await.unwrap();
    engine.translate("hello", CLIENT).await.unwrap();

    let requests = fake.requests();
    assert_eq!(requests[0].model, "gpt-3.5-turbo");
    assert_eq!(requests[1].model, "deepseek-chat");
    assert_eq!(requests[1].credential, "sk-a");
    assert_eq!(requests[2].credential, "sk-b");
    assert_eq!(engine.config().model, "deepseek-chat");
}

#[tokio::test]
async fn test_closed_pool_rejects_requests() {
    let fake = ScriptedCompletions::always(Scripted::reply("你好"));
    let (engine, _events) = engine(base_config(), &fake);

    engine.close();
    assert_eq!(
        engine.translate("hello", CLIENT).await,
        Err(RelayError::PoolClosed)
    );
    assert_eq!(fake.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_keep_separate_contexts() {
    let fake = ScriptedCompletions::always(Scripted::reply("好"));
    let (engine, _events) = engine(base_config(), &fake);
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.translate("hello", &format!("10.0.0.{}", i % 4)).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(engine.services().context.client_count(), 4);
    for i in 0..4 {
        let ctx = engine
            .services()
            .context
            .get(&client_key(&format!("10.0.0.{i}")))
            .unwrap();
        assert_eq!(ctx.len(), 4);
    }
}

#[tokio::test(start_paused = true)]
async fn test_retries_wait_one_second_each() {
    let fake = ScriptedCompletions::always(Scripted::Fail(CompletionError::Transport {
        status: Some(503),
        message: "unavailable".to_string(),
    }));
    let (engine, events) = engine_with_policy(base_config(), &fake, RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let result = engine.translate("hello", CLIENT).await;

    assert_eq!(result, Err(RelayError::RetriesExhausted { attempts: 5 }));
    assert_eq!(fake.calls(), 5);
    assert_elapsed(started, Duration::from_secs(4));
    let retries = events
        .names()
        .into_iter()
        .filter(|name| *name == "retry_scheduled")
        .count();
    assert_eq!(retries, 4);
}

#[tokio::test(start_paused = true)]
async fn test_single_worker_serializes_requests() {
    let fake = ScriptedCompletions::always(Scripted::Slow(
        Duration::from_millis(200),
        "好".to_string(),
    ));
    let config = RelayConfig {
        workers: 1,
        ..base_config()
    };
    let (engine, _events) = engine_with_policy(config, &fake, RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        engine.translate("hello", "10.0.0.1"),
        engine.translate("hello", "10.0.0.2"),
    );

    assert!(first.is_ok() && second.is_ok());
    assert_elapsed(started, Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_worker_permits_allow_parallel_requests() {
    let fake = ScriptedCompletions::always(Scripted::Slow(
        Duration::from_millis(200),
        "好".to_string(),
    ));
    let config = RelayConfig {
        workers: 2,
        ..base_config()
    };
    let (engine, _events) = engine_with_policy(config, &fake, RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        engine.translate("hello", "10.0.0.1"),
        engine.translate("hello", "10.0.0.2"),
    );

    assert!(first.is_ok() && second.is_ok());
    assert_elapsed(started, Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_permit_is_held_across_retry_delay() {
    let slow = Scripted::Slow(Duration::from_millis(200), "好".to_string());
    let fake = ScriptedCompletions::new([Scripted::Fail(CompletionError::Timeout)], slow);
    let config = RelayConfig {
        workers: 1,
        ..base_config()
    };
    let (engine, _events) = engine_with_policy(config, &fake, RetryPolicy::default());

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        engine.translate("hello", "10.0.0.1"),
        engine.translate("hello", "10.0.0.2"),
    );

    // One failed call, one 1 s delay, then both slow replies back to back.
    assert_eq!(fake.calls(), 3);
    assert!(first.is_ok() && second.is_ok());
    assert_elapsed(started, Duration::from_millis(1400));
}

#[tokio::test]
async fn test_token_usage_accumulates_across_attempts() {
    let per_call = TokenUsage {
        prompt_tokens: 20,
        completion_tokens: 4,
        total_tokens: 24,
    };
    let fake = ScriptedCompletions::new([Scripted::reply("")], Scripted::reply("你好"))
        .with_usage(per_call);
    let (engine, events) = engine(base_config(), &fake);

    assert_eq!(engine.translate("hello", CLIENT).await.as_deref(), Ok("你好"));

    // The rejected empty reply still consumed tokens.
    let totals = engine.services().usage.totals();
    assert_eq!(totals.prompt_tokens, 40);
    assert_eq!(totals.total_tokens, 48);
    match events.events().iter().rev().find(|e| e.name() == "token_usage") {
        Some(RelayEvent::TokenUsage { usage, totals: last }) => {
            assert_eq!(*usage, per_call);
            assert_eq!(*last, totals);
        }
        other => panic!("Expected a token_usage event, got {other:?}"),
    }
}
