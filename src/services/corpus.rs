// Reference Corpus Service
// Provides reference documents and their metadata to the analysis pipeline

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::models::{CorpusEntry, SourceRef};
use crate::services::text_processor::{normalize, tokenize_words};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Failed to read corpus file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse corpus file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Corpus is empty")]
    Empty,
}

/// Source of reference documents. `all_texts` and `metadata` are index-aligned.
pub trait CorpusProvider: Send + Sync {
    fn entries(&self) -> &[CorpusEntry];

    fn all_texts(&self) -> Vec<&str> {
        self.entries().iter().map(|e| e.text.as_str()).collect()
    }

    fn metadata(&self) -> Vec<SourceRef> {
        self.entries().iter().map(CorpusEntry::source_ref).collect()
    }

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Entries ranked by how many distinct query terms they contain, title terms
    /// included. Ties keep corpus order.
    fn search(&self, query: &str, limit: usize) -> Vec<&CorpusEntry> {
        let terms = term_set(query);
        let mut ranked: Vec<(usize, &CorpusEntry)> = self
            .entries()
            .iter()
            .map(|e| {
                let doc_terms = term_set(&format!("{} {}", e.title, e.text));
                (terms.intersection(&doc_terms).count(), e)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.into_iter().take(limit).map(|(_, e)| e).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    entries: Vec<CorpusEntry>,
}

impl InMemoryCorpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    /// Load `[{id, title, url, text}]` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, CorpusError> {
        let content = fs::read_to_string(path)?;
        let entries: Vec<CorpusEntry> = serde_json::from_str(&content)?;
        if entries.is_empty() {
            return Err(CorpusError::Empty);
        }
        info!(path = %path.display(), documents = entries.len(), "corpus.loaded");
        Ok(Self { entries })
    }

    /// Built-in reference set of five short academic texts.
    pub fn sample() -> Self {
        let entries = SAMPLE_DOCUMENTS
            .iter()
            .map(|(id, title, url, text)| CorpusEntry {
                id: id.to_string(),
                title: title.to_string(),
                url: url.to_string(),
                text: text.to_string(),
            })
            .collect();
        Self { entries }
    }
}

impl CorpusProvider for InMemoryCorpus {
    fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }
}

fn term_set(text: &str) -> HashSet<String> {
    tokenize_words(&normalize(text, true)).into_iter().collect()
}

const SAMPLE_DOCUMENTS: &[(&str, &str, &str, &str)] = &[
    (
        "sample_1",
        "Machine Learning Fundamentals",
        "https://academic.example.com/ml-fundamentals",
        "Machine learning is a subset of artificial intelligence that focuses on developing \
         algorithms and statistical models that enable computers to learn from and make \
         predictions or decisions based on data. The fundamental principle is to allow \
         machines to learn from experience without being explicitly programmed for every \
         specific task. Supervised learning involves training models on labeled data, \
         where the algorithm learns to map inputs to known outputs. Unsupervised learning, \
         on the other hand, deals with unlabeled data and seeks to find hidden patterns \
         or structures within the dataset. Deep learning, a specialized branch of machine \
         learning, utilizes artificial neural networks with multiple layers to extract \
         high-level features from raw data. Common applications include image recognition, \
         natural language processing, recommendation systems, and autonomous vehicles.",
    ),
    (
        "sample_2",
        "Climate Change and Global Warming",
        "https://academic.example.com/climate-change",
        "Climate change refers to long-term shifts in global or regional climate patterns, \
         primarily attributed to increased levels of atmospheric carbon dioxide produced \
         by the use of fossil fuels. Global warming is a key aspect of climate change, \
         characterized by the rising average temperature of Earth's climate system. The \
         primary causes include greenhouse gas emissions from human activities such as \
         burning coal, oil, and natural gas for energy, deforestation, and industrial \
         processes. The effects of climate change are wide-ranging and include rising sea \
         levels, more frequent extreme weather events, shifting wildlife populations and \
         habitats, and changes in precipitation patterns. Mitigation strategies focus on \
         reducing greenhouse gas emissions through renewable energy adoption, energy \
         efficiency improvements, and carbon capture technologies. Adaptation measures \
         involve preparing for and adjusting to the impacts of climate change that are \
         already occurring or anticipated in the future.",
    ),
    (
        "sample_3",
        "Quantum Computing Principles",
        "https://academic.example.com/quantum-computing",
        "Quantum computing represents a revolutionary approach to information processing \
         that leverages the principles of quantum mechanics. Unlike classical computers \
         that use bits representing either 0 or 1, quantum computers use quantum bits or \
         qubits that can exist in multiple states simultaneously through superposition. \
         This property, along with quantum entanglement, enables quantum computers to \
         perform certain calculations exponentially faster than classical computers. The \
         fundamental operations in quantum computing involve quantum gates that manipulate \
         qubit states through unitary transformations. Quantum algorithms such as Shor's \
         algorithm for factoring large numbers and Grover's algorithm for searching \
         unsorted databases demonstrate the potential advantages of quantum computing. \
         Current challenges include maintaining quantum coherence, error correction, and \
         scaling up the number of qubits while minimizing decoherence and noise.",
    ),
    (
        "sample_4",
        "Blockchain Technology and Cryptocurrencies",
        "https://academic.example.com/blockchain",
        "Blockchain is a distributed ledger technology that maintains a continuously \
         growing list of records called blocks, which are linked and secured using \
         cryptography. Each block contains a cryptographic hash of the previous block, \
         a timestamp, and transaction data. This structure makes the blockchain inherently \
         resistant to modification of data, as altering any single block would require \
         changing all subsequent blocks. The decentralized nature of blockchain eliminates \
         the need for a central authority, instead relying on a network of nodes to \
         validate and record transactions through consensus mechanisms such as Proof of \
         Work or Proof of Stake. Cryptocurrencies like Bitcoin and Ethereum are the most \
         well-known applications of blockchain technology, but the technology has broader \
         applications in supply chain management, digital identity verification, smart \
         contracts, and decentralized finance. The immutability and transparency of \
         blockchain make it particularly valuable for applications requiring trust and \
         auditability without intermediaries.",
    ),
    (
        "sample_5",
        "Artificial Neural Networks",
        "https://academic.example.com/neural-networks",
        "Artificial neural networks are computing systems inspired by the biological \
         neural networks that constitute animal brains. These networks consist of \
         interconnected nodes or neurons organized in layers, typically including an \
         input layer, one or more hidden layers, and an output layer. Each connection \
         between neurons has an associated weight that adjusts as learning proceeds, \
         strengthening or weakening the signal transmitted between neurons. The learning \
         process involves adjusting these weights through algorithms like backpropagation, \
         which minimizes the difference between the network's output and the desired \
         output. Activation functions introduce non-linearity into the network, enabling \
         it to learn complex patterns and relationships in data. Deep neural networks, \
         which contain multiple hidden layers, have demonstrated remarkable success in \
         various domains including computer vision, speech recognition, and natural \
         language understanding. Modern architectures such as convolutional neural \
         networks excel at processing grid-like data such as images, while recurrent \
         neural networks are well-suited for sequential data like text and time series.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    #[test]
    fn test_sample_corpus_is_index_aligned() {
        let corpus = InMemoryCorpus::sample();
        assert_eq!(corpus.len(), 5);
        let texts = corpus.all_texts();
        let meta = corpus.metadata();
        assert_eq!(texts.len(), meta.len());
        assert!(texts[2].starts_with("Quantum computing"));
        assert_eq!(meta[2].title, "Quantum Computing Principles");
        assert_eq!(meta[2].url, "https://academic.example.com/quantum-computing");
    }

    #[test]
    fn test_search_ranks_by_term_overlap() {
        let corpus = InMemoryCorpus::sample();
        let hits = corpus.search("qubits superposition entanglement", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "sample_3");

        let hits = corpus.search("blockchain ledger bitcoin", 1);
        assert_eq!(hits[0].id, "sample_4");
    }

    #[test]
    fn test_search_without_terms_keeps_corpus_order() {
        let corpus = InMemoryCorpus::sample();
        let ids: Vec<&str> = corpus.search("", 3).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["sample_1", "sample_2", "sample_3"]);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "title": "A", "url": "https://a.example", "text": "alpha text"}}]"#
        )
        .unwrap();
        let corpus = InMemoryCorpus::from_json_file(file.path()).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.metadata()[0].url, "https://a.example");
    }

    #[test]
    fn test_from_json_file_rejects_empty_and_garbage() {
        let mut empty = NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert!(matches!(
            InMemoryCorpus::from_json_file(empty.path()),
            Err(CorpusError::Empty)
        ));

        let mut garbage = NamedTempFile::new().unwrap();
        write!(garbage, "nope").unwrap();
        assert!(matches!(
            InMemoryCorpus::from_json_file(garbage.path()),
            Err(CorpusError::Parse(_))
        ));
    }
}
