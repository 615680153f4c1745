use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use knowdb_core::types::{NoteLink, Scope, SearchMode, Topic};
use knowdb_hybrid::KnowledgeBase;
use knowdb_vector::OptimizeOutcome;

use crate::{CategoryCommand, NoteCommand, TopicCommand};

const INGEST_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

fn is_ingestible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| INGEST_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_ingestible(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

async fn resolve_topic(kb: &KnowledgeBase, category: &str, topic: &str) -> anyhow::Result<Topic> {
    let category = kb.resolve_category(category).await?;
    Ok(kb.resolve_topic(&category.id, topic).await?)
}

pub async fn init(kb: &KnowledgeBase, seed: bool) -> anyhow::Result<()> {
    let created = kb.init(seed && kb.settings().seed_sample_data).await?;
    println!("✅ Knowledge base ready at {}", kb.settings().storage.path.display());
    for c in created {
        println!("   seeded category {} ({})", c.name, c.id);
    }
    Ok(())
}

pub async fn reset(kb: &KnowledgeBase, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("reset deletes everything; pass --yes to confirm");
    }
    kb.reset(true).await?;
    println!("🧹 Knowledge base reset");
    Ok(())
}

pub async fn ingest(kb: &KnowledgeBase, path: &Path, category: &str, topic: &str) -> anyhow::Result<()> {
    let topic = resolve_topic(kb, category, topic).await?;
    let files = collect_files(path);
    if files.is_empty() {
        bail!("no .md/.txt files found at {}", path.display());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    let mut failed = 0usize;
    let mut chunks = 0usize;
    for file in &files {
        let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        pb.set_message(name.clone());
        let result = match fs::read_to_string(file) {
            Ok(text) => kb.ingest(&name, &text, &topic.id).await.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context(format!("reading {}", file.display()))),
        };
        match result {
            Ok(doc) => chunks += doc.chunk_count,
            Err(e) => {
                failed += 1;
                tracing::error!(file = %file.display(), error = %e, "ingest failed");
                pb.println(format!("❌ {}: {:#}", file.display(), e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("📊 Ingested {} of {} file(s), {} chunk(s), into {}", files.len() - failed, files.len(), chunks, topic.name);
    if failed > 0 {
        bail!("{} file(s) failed to ingest", failed);
    }
    Ok(())
}

pub async fn search(
    kb: &KnowledgeBase,
    query: &str,
    mode: SearchMode,
    top_k: usize,
    category: Option<&str>,
    topic: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let scope = match (category, topic) {
        (Some(c), Some(t)) => Scope::Topic(resolve_topic(kb, c, t).await?.id),
        (Some(c), None) => Scope::Category(kb.resolve_category(c).await?.id),
        _ => Scope::All,
    };
    let response = kb.search(query, mode, top_k, &scope).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    for w in &response.warnings {
        println!("⚠️  {}", w);
    }
    println!("🔍 {} result(s) for \"{}\" ({})", response.results.len(), query, mode);
    for (i, r) in response.results.iter().enumerate() {
        println!("\n  {}. score={:.4} relevance={:.3}  {}  [{}]", i + 1, r.score, r.relevance, r.filename, r.chunk_id);
        let snippet: String = r.text.chars().take(240).collect();
        println!("     {}", snippet.replace('\n', " "));
    }
    Ok(())
}

pub async fn show(kb: &KnowledgeBase, id: &str, with_chunks: bool) -> anyhow::Result<()> {
    let doc = kb.get_document(id).await?;
    println!("📄 {} ({})", doc.filename, doc.id);
    println!("   category={} topic={} chunks={} ingested_at={}", doc.category_id, doc.topic_id, doc.chunk_count, doc.ingested_at);
    if with_chunks {
        for c in kb.document_chunks(id).await? {
            println!("\n--- chunk {} [{}..{}]", c.ordinal, c.start, c.end);
            println!("{}", c.text);
        }
    } else {
        println!("\n{}", doc.text);
    }
    Ok(())
}

pub async fn move_document(kb: &KnowledgeBase, id: &str, category: &str, topic: &str) -> anyhow::Result<()> {
    let topic = resolve_topic(kb, category, topic).await?;
    let doc = kb.move_document(id, &topic.id).await?;
    println!("📦 Moved {} to {}", doc.filename, topic.name);
    Ok(())
}

pub async fn category(kb: &KnowledgeBase, cmd: CategoryCommand) -> anyhow::Result<()> {
    match cmd {
        CategoryCommand::Add { name, description } => {
            let c = kb.create_category(&name, &description).await?;
            println!("Created category {} ({})", c.name, c.id);
        }
        CategoryCommand::List { json } => {
            let tree = kb.hierarchy().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
                return Ok(());
            }
            for node in tree {
                println!("📁 {} ({})", node.category.name, node.category.id);
                for t in node.topics {
                    println!("   └─ {} ({}) {} document(s)", t.topic.name, t.topic.id, t.documents.len());
                    for d in t.documents {
                        println!("        • {} ({}, {} chunks)", d.filename, d.id, d.chunk_count);
                    }
                }
            }
        }
        CategoryCommand::Rename { category, name } => {
            let c = kb.resolve_category(&category).await?;
            let c = kb.rename_category(&c.id, &name).await?;
            println!("Renamed category to {}", c.name);
        }
        CategoryCommand::Delete { category, yes } => {
            let c = kb.resolve_category(&category).await?;
            kb.delete_category(&c.id, yes).await?;
            println!("🗑️  Deleted category {}", c.name);
        }
    }
    Ok(())
}

pub async fn topic(kb: &KnowledgeBase, cmd: TopicCommand) -> anyhow::Result<()> {
    match cmd {
        TopicCommand::Add { category, name, description } => {
            let c = kb.resolve_category(&category).await?;
            let t = kb.create_topic(&c.id, &name, &description).await?;
            println!("Created topic {} ({}) in {}", t.name, t.id, c.name);
        }
        TopicCommand::List { category } => {
            let category_id = match category {
                Some(c) => Some(kb.resolve_category(&c).await?.id),
                None => None,
            };
            for t in kb.list_topics(category_id.as_deref()).await? {
                println!("{}  {}  (category {})", t.id, t.name, t.category_id);
            }
        }
        TopicCommand::Rename { category, topic, name } => {
            let t = resolve_topic(kb, &category, &topic).await?;
            let t = kb.rename_topic(&t.id, &name).await?;
            println!("Renamed topic to {}", t.name);
        }
        TopicCommand::Delete { category, topic, yes } => {
            let t = resolve_topic(kb, &category, &topic).await?;
            kb.delete_topic(&t.id, yes).await?;
            println!("🗑️  Deleted topic {}", t.name);
        }
    }
    Ok(())
}

pub async fn note(kb: &KnowledgeBase, cmd: NoteCommand) -> anyhow::Result<()> {
    match cmd {
        NoteCommand::Add { content, document, topic } => {
            let link = match (document, topic) {
                (Some(d), _) => Some(NoteLink::Document(d)),
                (None, Some(t)) => Some(NoteLink::Topic(t)),
                (None, None) => None,
            };
            let n = kb.create_note(&content, link).await?;
            println!("📝 {} ({})  {}", n.title, n.id, n.tags.join(" "));
        }
        NoteCommand::List { json } => {
            let notes = kb.list_notes(None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
                return Ok(());
            }
            for n in notes {
                let link = n.link.as_ref().map(|l| format!(" -> {} {}", l.kind(), l.target())).unwrap_or_default();
                println!("{}  {}{}", n.id, n.title, link);
            }
        }
        NoteCommand::Show { id } => {
            let n = kb.get_note(&id).await?;
            println!("📝 {}\n{}\n\n{}", n.title, n.tags.join(" "), n.content);
        }
        NoteCommand::Delete { id } => {
            kb.delete_note(&id).await?;
            println!("🗑️  Deleted note {}", id);
        }
    }
    Ok(())
}

pub async fn stats(kb: &KnowledgeBase) -> anyhow::Result<()> {
    let s = kb.stats().await.context("reading store statistics")?;
    println!("📊 documents={} chunks={} categories={} topics={} notes={}", s.documents, s.chunks, s.categories, s.topics, s.notes);
    println!("   embedder={} dimensions={}", s.embedder_id, s.dimensions);
    Ok(())
}

pub async fn optimize(kb: &KnowledgeBase) -> anyhow::Result<()> {
    match kb.optimize().await? {
        OptimizeOutcome::Skipped { rows, required } => {
            println!("ℹ️  {} chunk(s) stored; at least {} needed for an ANN index, exhaustive search stays in use", rows, required);
        }
        OptimizeOutcome::Built { rows, params } => {
            println!(
                "✅ Built IVF_PQ index over {} chunk(s): {} partitions, {} sub-vectors",
                rows, params.num_partitions, params.num_sub_vectors
            );
        }
    }
    Ok(())
}
