//! Retrieval over a fixed reference corpus.
//!
//! Several capabilities ground their replies in curated passages on coping
//! techniques and decision frameworks. Ranking is lexical overlap between
//! query and passage — good enough for a small, hand-picked corpus, and it
//! keeps embedding infrastructure out of scope.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::capability::Category;

/// One ranked unit of reference text.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub source: &'static str,
    pub text: &'static str,
}

/// Retrieval capability: ranked passages for a query. Opaque to the core;
/// only capabilities call it.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str) -> Vec<Passage>;
}

/// Keyword-overlap retriever over a fixed passage set.
pub struct CorpusRetriever {
    passages: &'static [Passage],
    limit: usize,
}

impl CorpusRetriever {
    pub fn new(passages: &'static [Passage], limit: usize) -> Self {
        Self { passages, limit }
    }
}

impl Retriever for CorpusRetriever {
    fn retrieve(&self, query: &str) -> Vec<Passage> {
        let query_terms: Vec<String> = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &Passage)> = self
            .passages
            .iter()
            .map(|passage| {
                let text = passage.text.to_lowercase();
                let score = query_terms
                    .iter()
                    .filter(|term| text.contains(term.as_str()))
                    .count();
                (score, passage)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.limit)
            .map(|(_, passage)| passage.clone())
            .collect()
    }
}

/// Query terms worth matching: lowercase alphanumeric words of three or
/// more characters.
fn terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Reference corpora
// ---------------------------------------------------------------------------

static GROUNDING_CORPUS: Lazy<Vec<Passage>> = Lazy::new(|| {
    vec![
        Passage {
            source: "grounding-techniques",
            text: "The 5-4-3-2-1 grounding technique interrupts anxious spirals by \
                   walking the senses: name five things you can see, four you can \
                   touch, three you can hear, two you can smell, and one you can \
                   taste. It anchors attention in the present moment.",
        },
        Passage {
            source: "box-breathing",
            text: "Box breathing slows a racing stress response: inhale for four \
                   counts, hold for four, exhale for four, hold for four, and \
                   repeat for a few minutes. Slow exhalation activates the \
                   parasympathetic nervous system.",
        },
        Passage {
            source: "body-scan",
            text: "A body scan is a mindfulness exercise that moves attention \
                   slowly from head to toe, noticing tension without judging it. \
                   Regular practice reduces baseline anxiety and improves sleep.",
        },
        Passage {
            source: "physical-grounding",
            text: "Physical grounding techniques for acute anxiety include running \
                   cool water over your hands, holding an ice cube, or pressing \
                   your feet firmly into the floor while naming the sensation.",
        },
    ]
});

static CRISIS_CORPUS: Lazy<Vec<Passage>> = Lazy::new(|| {
    vec![
        Passage {
            source: "988-lifeline",
            text: "The 988 Suicide and Crisis Lifeline connects callers in the \
                   United States with trained crisis counselors by phone, text, \
                   or chat, free and confidential, 24 hours a day. If someone is \
                   in immediate danger, call or text 988, or call local emergency \
                   services.",
        },
        Passage {
            source: "crisis-anxiety",
            text: "In an acute crisis, keep instructions short and concrete: stay \
                   with the person, help them slow their breathing, remove \
                   immediate stressors, and connect them with professional help. \
                   Avoid minimizing what they feel.",
        },
        Passage {
            source: "grounding-techniques",
            text: "Grounding techniques such as naming objects in the room or \
                   feeling your feet on the floor can steady someone who is \
                   overwhelmed enough that reasoning has stopped helping.",
        },
    ]
});

static DECISION_CORPUS: Lazy<Vec<Passage>> = Lazy::new(|| {
    vec![
        Passage {
            source: "eisenhower-matrix",
            text: "The Eisenhower matrix sorts options by urgency and importance \
                   into four quadrants: do now, schedule, delegate, and drop. It \
                   is most useful when everything feels equally pressing.",
        },
        Passage {
            source: "weighted-decision-matrix",
            text: "A weighted decision matrix lists the options as rows and the \
                   criteria that matter as columns, assigns each criterion a \
                   weight, scores every option, and sums the weighted scores. The \
                   arithmetic matters less than being forced to state the \
                   criteria.",
        },
        Passage {
            source: "any-decision-beats-indecision",
            text: "For reversible choices, any decision is usually better than \
                   prolonged indecision: set a deadline, limit the options to \
                   three, decide, and treat the outcome as information rather \
                   than a verdict.",
        },
        Passage {
            source: "ten-ten-ten",
            text: "The 10-10-10 rule reframes a choice by asking how you will \
                   feel about it ten minutes, ten months, and ten years from \
                   now, which separates short-lived discomfort from lasting \
                   consequences.",
        },
    ]
});

static ROOT_CAUSE_CORPUS: Lazy<Vec<Passage>> = Lazy::new(|| {
    vec![
        Passage {
            source: "five-whys",
            text: "The five whys technique asks why a problem occurs, then asks \
                   why of each answer, about five times, until a root cause \
                   appears that you can act on rather than a symptom.",
        },
        Passage {
            source: "overcoming-indecisiveness",
            text: "Chronic indecisiveness usually traces to fear of failure, \
                   perfectionism, or outsourcing self-trust. Naming which fear is \
                   active, shrinking the decision's stakes, and rehearsing small \
                   fast choices rebuilds the deciding muscle.",
        },
        Passage {
            source: "streamlining-decisions",
            text: "Streamlining decision-making means removing repeated choices: \
                   set defaults, batch similar decisions, and pre-commit to rules \
                   so willpower is spent only on the choices that matter.",
        },
    ]
});

static HABIT_CORPUS: Lazy<Vec<Passage>> = Lazy::new(|| {
    vec![
        Passage {
            source: "stress-relief-habits",
            text: "Durable stress reduction comes from routines rather than \
                   rescues: regular exercise, consistent sleep, time outdoors, \
                   limiting caffeine late in the day, and a daily wind-down \
                   ritual all lower baseline anxiety over weeks.",
        },
        Passage {
            source: "mindfulness-habit",
            text: "Ten minutes of daily mindfulness practice, kept small enough \
                   to be unmissable, outperforms occasional long sessions. Tie \
                   it to an existing habit such as morning coffee to make it \
                   stick.",
        },
        Passage {
            source: "journaling",
            text: "A short evening journal that records what caused stress and \
                   what helped builds the self-knowledge that prevention \
                   depends on, and makes progress visible when motivation dips.",
        },
    ]
});

/// The reference corpus retriever for a category, if the category grounds
/// its replies in one. The classifier, extractor, and general chat run
/// without retrieval.
pub fn corpus_retriever(category: Category) -> Option<Arc<dyn Retriever>> {
    let passages: &'static [Passage] = match category {
        Category::Crisis => &CRISIS_CORPUS,
        Category::DecisionSupport => &DECISION_CORPUS,
        Category::RootCause => &ROOT_CAUSE_CORPUS,
        Category::HabitCoaching => &HABIT_CORPUS,
        Category::StressRelief => &GROUNDING_CORPUS,
        Category::General => return None,
    };
    Some(Arc::new(CorpusRetriever::new(passages, 3)))
}
