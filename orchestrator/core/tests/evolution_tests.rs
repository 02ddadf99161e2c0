// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use autoreel_core::application::evolution::selection::successor_dna;
use autoreel_core::application::evolution::EvolutionEngine;
use autoreel_core::application::repository_factory::Repositories;
use autoreel_core::domain::agent::{Agent, AgentDna, StrategyWeights};
use autoreel_core::domain::config::EvolutionConfig;
use autoreel_core::domain::gene_pool::GenePoolEntry;
use autoreel_core::domain::proposal::ContentVariant;
use autoreel_core::infrastructure::event_bus::EventBus;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

#[tokio::test]
async fn test_chronic_strugglers_are_replaced_after_two_runs() {
    let repos = Repositories::in_memory();
    let engine = EvolutionEngine::new(repos.clone(), EvolutionConfig::default(), EventBus::new(64));
    let agents = engine
        .seed_population(&[ContentVariant::Light, ContentVariant::Dark], 5)
        .await
        .unwrap();
    for (i, mut agent) in agents.into_iter().enumerate() {
        agent.survival_score = (i + 1) as f64;
        repos.agents.save(&agent).await.unwrap();
    }
    let mut rng = StdRng::seed_from_u64(42);
    let now = Utc::now();

    let first = engine.run_selection_with(now, &mut rng).await.unwrap();
    assert_eq!(first.archived.len(), 4);
    assert_eq!(first.struggling.len(), 2);
    assert!(first.retired.is_empty());

    let second = engine
        .run_selection_with(now + Duration::weeks(1), &mut rng)
        .await
        .unwrap();
    assert_eq!(second.retired.len(), 2);
    assert_eq!(second.spawned.len(), 2);
    for child in &second.spawned {
        let parent = repos
            .agents
            .find_by_id(child.parent_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(!parent.active);
        assert_eq!(child.generation, parent.generation + 1);
        assert!(child.validate().is_ok());
    }
    assert_eq!(repos.agents.list_active().await.unwrap().len(), 10);
}

fn parent() -> Agent {
    let weights = StrategyWeights::normalized(BTreeMap::from([
        ("explainer".to_string(), 3.0),
        ("listicle".to_string(), 1.0),
    ]))
    .unwrap();
    Agent::new("light-1", ContentVariant::Light, AgentDna::new(weights, 0.8).unwrap())
}

#[test]
fn test_gene_pool_round_trip_without_noise() {
    let archived = parent();
    let entry = GenePoolEntry::archive(&archived, Utc::now());
    let strategies = vec!["explainer".to_string(), "listicle".to_string()];
    let mut rng = StdRng::seed_from_u64(7);

    let (dna, source) = successor_dna(&parent(), &[entry.clone()], &strategies, 1.0, 0.0, &mut rng).unwrap();
    assert_eq!(source, Some(entry.id));
    assert_eq!(dna, archived.dna);
}

#[test]
fn test_inheritance_rate_tracks_probability() {
    let entry = GenePoolEntry::archive(&parent(), Utc::now());
    let strategies = vec!["explainer".to_string(), "listicle".to_string()];
    let mut rng = StdRng::seed_from_u64(11);

    let inherited = (0..2_000)
        .filter(|_| {
            successor_dna(&parent(), &[entry.clone()], &strategies, 0.8, 0.05, &mut rng)
                .unwrap()
                .1
                .is_some()
        })
        .count();
    let rate = inherited as f64 / 2_000.0;
    assert!((0.75..0.85).contains(&rate), "inheritance rate {}", rate);
}
