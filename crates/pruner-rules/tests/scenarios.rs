use anyhow::Result;
use chrono::{TimeDelta, Utc};
use pruner_rules::{CompileError, CompiledRule, EvalContext, Type, compile, evaluate};
use pruner_test_support::fixtures::{catalog_torrents, scenario_torrents};
use pruner_torrent_core::{Bytes, Torrent};

const TWO_GIB: i64 = 2 * 1024 * 1024 * 1024;

fn hashes(torrents: &[Torrent]) -> Vec<&str> {
    torrents.iter().map(|t| t.hash.as_str()).collect()
}

fn run(source: &str, disk: i64) -> Result<Vec<String>> {
    let now = Utc::now();
    let torrents = scenario_torrents(now);
    let rule = compile(source)?;
    let selected = evaluate(&rule, &torrents, &EvalContext::at(Bytes(disk), now))?;
    Ok(selected.into_iter().map(|t| t.hash).collect())
}

#[test]
fn large_long_seeded_torrents() -> Result<()> {
    let picked = run(
        r#"filter(torrents, .size > 10240000 && .seeding_time > duration("1h"))"#,
        TWO_GIB,
    )?;
    assert_eq!(picked, ["t2", "t3"]);
    Ok(())
}

#[test]
fn poorly_seeded_and_idle_torrents() -> Result<()> {
    let picked = run(
        r#"filter(torrents, .seeder / .leecher < 1 && now() - .last_activity > duration("1h"))"#,
        TWO_GIB,
    )?;
    assert_eq!(picked, ["t3"]);
    Ok(())
}

#[test]
fn disk_threshold_above_free_space_selects_nothing() -> Result<()> {
    let picked = run(r#"filter(torrents, disk < bytes("10M"))"#, TWO_GIB)?;
    assert!(picked.is_empty());

    let picked = run(r#"filter(torrents, disk < bytes("10M"))"#, 1_000)?;
    assert_eq!(picked, ["t1", "t2", "t3"]);
    Ok(())
}

#[test]
fn string_operators_match_names_and_categories() -> Result<()> {
    let catalog = catalog_torrents();
    let ctx = EvalContext::new(Bytes::ZERO);

    let rule = CompiledRule::compile(r#"filter(torrents, .category == "TV Shows" && .name endsWith "G")"#)?;
    assert_eq!(hashes(&rule.evaluate(&catalog, &ctx)?), ["tv-show-g"]);

    let rule = CompiledRule::compile(r#"filter(torrents, .name matches "^Movie [A-E]$")"#)?;
    assert_eq!(hashes(&rule.evaluate(&catalog, &ctx)?), ["movie-a", "movie-e"]);

    let rule = CompiledRule::compile(r#"filter(torrents, .hash startsWith "tv-" || .name contains "Game")"#)?;
    assert_eq!(
        hashes(&rule.evaluate(&catalog, &ctx)?),
        ["tv-show-b", "game-c", "tv-show-f", "tv-show-g"]
    );
    Ok(())
}

#[test]
fn selection_is_an_ordered_subset_of_the_input() -> Result<()> {
    let now = Utc::now();
    let torrents = scenario_torrents(now);
    let ctx = EvalContext::at(Bytes(TWO_GIB), now);
    for source in [
        "torrents",
        "filter(torrents, false)",
        "filter(torrents, .ratio >= 1)",
        "filter(torrents, .progress < 100 || .up_speed > 1000000)",
        r#"filter(torrents, .added_time + duration("7d") < now())"#,
    ] {
        let rule = compile(source)?;
        let picked = rule.select(&torrents, &ctx)?;
        let mut cursor = torrents.iter();
        for item in &picked {
            assert!(
                cursor.any(|t| std::ptr::eq(t, *item)),
                "{source} reordered or invented torrents"
            );
        }
    }
    Ok(())
}

#[test]
fn never_active_torrents_are_treated_as_stale() -> Result<()> {
    let now = Utc::now();
    let mut torrents = scenario_torrents(now);
    torrents[1].last_activity = None;
    let rule = compile(r#"filter(torrents, now() - .last_activity > duration("1h"))"#)?;
    let picked = rule.evaluate(&torrents, &EvalContext::at(Bytes::ZERO, now))?;
    assert_eq!(hashes(&picked), ["t1", "t2", "t3"]);
    Ok(())
}

#[test]
fn clock_is_taken_from_the_context() -> Result<()> {
    let now = Utc::now();
    let torrents = scenario_torrents(now);
    let rule = compile(r#"filter(torrents, now() - .last_activity > duration("3h"))"#)?;

    let picked = rule.evaluate(&torrents, &EvalContext::at(Bytes::ZERO, now))?;
    assert_eq!(hashes(&picked), ["t3"]);

    let later = EvalContext::at(Bytes::ZERO, now + TimeDelta::hours(3));
    let picked = rule.evaluate(&torrents, &later)?;
    assert_eq!(hashes(&picked), ["t1", "t2", "t3"]);
    Ok(())
}

#[test]
fn malformed_rules_are_rejected_at_compile_time() {
    assert!(matches!(
        compile("filter(torrents, .size >"),
        Err(CompileError::UnexpectedToken { .. })
    ));
    assert!(matches!(
        compile("filter(torrents, .size > 1) && true"),
        Err(CompileError::TypeMismatch { .. })
    ));
    assert!(matches!(
        compile("len(torrents)"),
        Err(CompileError::UnknownFunction { .. })
    ));
    assert!(matches!(
        compile("now()"),
        Err(CompileError::ResultType { found: Type::Time })
    ));
    assert!(matches!(
        compile("filter(torrents, .name == 'x)"),
        Err(CompileError::UnterminatedString { .. })
    ));
}

#[test]
fn disk_usage_is_reported_to_callers() -> Result<()> {
    assert!(compile(r#"filter(torrents, disk < bytes("10GiB"))"#)?.uses_disk());
    assert!(!compile("filter(torrents, .ratio > 2)")?.uses_disk());
    Ok(())
}

#[test]
fn pathologically_nested_rules_are_compile_errors() -> Result<()> {
    let deep = format!(
        "filter(torrents, {}true{})",
        "(".repeat(1000),
        ")".repeat(1000)
    );
    assert!(matches!(
        compile(&deep),
        Err(CompileError::TooDeep { limit: 128, .. })
    ));

    let sizes = vec![".size"; 200].join(" + ");
    assert!(matches!(
        compile(&format!("filter(torrents, {sizes} > 0)")),
        Err(CompileError::TooDeep { .. })
    ));

    let nested = format!(
        "filter(torrents, {}.ratio > 2{})",
        "(".repeat(60),
        ")".repeat(60)
    );
    assert_eq!(run(&nested, 0)?, ["t2"]);
    Ok(())
}
