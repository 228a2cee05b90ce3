use plagcheck_lib::models::{CombinedScore, Fragment, SimilarityWeights};
use plagcheck_lib::services::detection::AiTextDetector;
use plagcheck_lib::services::similarity::{FragmentMatcher, SimilarityEngine};
use plagcheck_lib::services::text_processor::normalize;
use plagcheck_lib::services::{build_classifier, build_embedding_model, EmbeddingModel};
use plagcheck_lib::{has_flag, init_logging, load_config, parse_arg_value, read_input};
use serde::Serialize;

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

fn parse_weights(raw: &str) -> anyhow::Result<SimilarityWeights> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()?;
    if parts.len() != 4 {
        anyhow::bail!("--weights expects 4 comma-separated values (character,fuzzy,lexical,semantic)");
    }
    Ok(SimilarityWeights {
        character: parts[0],
        fuzzy: parts[1],
        lexical: parts[2],
        semantic: parts[3],
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage:\n  compare_texts <a.txt> <b.txt> [--weights c,f,l,s] [--threshold <t>] [--fragment-size <n>] [--fragments <n>] [--raw] [--ai] [--out <json_path>]\n\nNotes:\n  - Both texts are normalized before scoring unless --raw is given.\n  - `--ai` also runs AI-text detection on the first text."
        );
        return Ok(());
    }

    init_logging();

    let path_a = args[1].clone();
    let path_b = args[2].clone();
    let threshold: f64 = parse_arg_value(&args, "--threshold")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.7);
    let fragment_size: usize = parse_arg_value(&args, "--fragment-size")
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);
    let fragments_n: usize = parse_arg_value(&args, "--fragments")
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let weights = match parse_arg_value(&args, "--weights") {
        Some(raw) => parse_weights(&raw)?,
        None => SimilarityWeights::default(),
    };
    let raw = has_flag(&args, "--raw");
    let run_ai = has_flag(&args, "--ai");
    let out_path = parse_arg_value(&args, "--out");

    let config = load_config(None)?;
    let embedder = build_embedding_model(&config);

    let original_a = read_input(&path_a)?;
    let original_b = read_input(&path_b)?;
    let (text_a, text_b) = if raw {
        (original_a.clone(), original_b.clone())
    } else {
        (normalize(&original_a, false), normalize(&original_b, false))
    };

    println!("A: {} ({} chars)", path_a, text_a.chars().count());
    println!("B: {} ({} chars)", path_b, text_b.chars().count());
    println!("Embedding model: {}", embedder.name());
    println!();

    let engine = SimilarityEngine::new(embedder);
    let combined: CombinedScore = engine.combined_score(&text_a, &text_b, Some(&weights)).await?;
    let c = combined.components;
    println!("character  {:.3}", c.character);
    println!("fuzzy      {:.3}", c.fuzzy);
    println!("lexical    {:.3}", c.lexical);
    println!("semantic   {:.3}", c.semantic);
    println!("overall    {:.3}", combined.overall);
    for d in &combined.diagnostics {
        println!("  degraded {}: {}", d.scorer, d.reason);
    }
    println!();

    let matcher = FragmentMatcher::new(engine)
        .with_threshold(threshold)
        .with_fragment_size(fragment_size)
        .with_weights(weights);
    let fragments: Vec<Fragment> = matcher.find_matching_fragments(&text_a, &[text_b.as_str()]).await?;

    println!("Matching fragments: {}", fragments.len());
    for (i, f) in fragments.iter().take(fragments_n).enumerate() {
        println!("[F{:02}] score={:.3}  {}", i, f.score, preview(&f.text, 100));
        println!("      matched    {}", preview(&f.matched_text, 100));
    }
    if fragments.len() > fragments_n {
        println!("... ({} more fragments)", fragments.len() - fragments_n);
    }

    let ai = if run_ai {
        let classifier = build_classifier(&config);
        let detector = AiTextDetector::new(classifier, config.detection.clone());
        let result = detector.detect(&original_a).await;
        println!();
        println!(
            "AI probability (A): {:.3} [{}]",
            result.probability, result.confidence_description
        );
        Some(result)
    } else {
        None
    };

    if let Some(out_path) = out_path {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output {
            a: String,
            b: String,
            normalized: bool,
            threshold: f64,
            fragment_size: usize,
            weights: SimilarityWeights,
            combined: CombinedScore,
            fragments: Vec<Fragment>,
            #[serde(skip_serializing_if = "Option::is_none")]
            ai_detection: Option<plagcheck_lib::models::AiResult>,
        }

        let out = Output {
            a: path_a,
            b: path_b,
            normalized: !raw,
            threshold,
            fragment_size,
            weights,
            combined,
            fragments,
            ai_detection: ai,
        };

        let json = serde_json::to_string_pretty(&out)?;
        std::fs::write(&out_path, json)?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
