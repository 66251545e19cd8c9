//! Query expansion over a static concept graph.

use tracing::debug;

/// Related terms per concept, in priority order.
const TERM_RELATIONS: &[(&str, &[&str])] = &[
    ("хаос", &["расфокус", "разбросанность", "незавершённое", "флюгер", "внимание"]),
    ("тупик", &["застревание", "стеклянный потолок", "день сурка", "стагнация"]),
    ("поворот", &["изменения", "страх перемен", "новое начало", "трансформация"]),
    ("развитие", &["рост", "прогресс", "движение", "улучшение"]),
    ("собранность", &["фокус", "концентрация", "внимание", "целостность", "агентность"]),
    ("агентность", &["автономия", "действие", "инициатива", "контроль", "влияние"]),
    ("мастерство", &["навык", "умение", "компетенция", "экспертиза", "практика"]),
    ("ясность", &["понимание", "чёткость", "определённость", "видение"]),
    ("слот саморазвития", &["время для себя", "практика", "регулярность", "ритм"]),
    ("трекер", &["отслеживание", "учёт", "метрики", "прогресс", "дневник"]),
    ("рабочий продукт", &["результат", "артефакт", "выход", "deliverable"]),
    ("мем", &["единица мышления", "концепция", "идея", "паттерн"]),
    ("прокрастинация", &["откладывание", "избегание", "завтра", "потом"]),
    ("выгорание", &["истощение", "усталость", "burnout", "перегрузка"]),
    ("быстрые удовольствия", &["соцсети", "сериалы", "игры", "дофамин", "отвлечения"]),
    ("системное мышление", &["системный подход", "холизм", "взаимосвязи", "эмерджентность"]),
    ("экзокортекс", &["внешний мозг", "заметки", "база знаний", "second brain"]),
    ("итерации", &["циклы", "повторения", "спринты", "улучшения"]),
    ("инкременты", &["приращения", "шаги", "малые изменения"]),
    ("созидатель", &["творец", "создатель", "деятель", "maker"]),
    ("практикующий ученик", &["осознанный ученик", "системный ученик"]),
    ("systems thinking", &["systems approach", "holism", "interconnections", "emergence"]),
    ("procrastination", &["postponing", "avoidance", "distraction"]),
    ("burnout", &["exhaustion", "fatigue", "overload"]),
    ("attention", &["focus", "concentration", "distraction"]),
    ("work product", &["result", "artifact", "deliverable"]),
];

/// One-way replacements; pairs are listed in both directions where needed.
const SYNONYMS: &[(&str, &str)] = &[
    ("саморазвитие", "самосовершенствование"),
    ("самосовершенствование", "саморазвитие"),
    ("целеполагание", "постановка целей"),
    ("постановка целей", "целеполагание"),
    ("тайм-менеджмент", "управление временем"),
    ("управление временем", "тайм-менеджмент"),
    ("осознанность", "mindfulness"),
    ("mindfulness", "осознанность"),
    ("медитация", "практика осознанности"),
    ("фокус", "концентрация"),
    ("концентрация", "фокус"),
    ("time management", "productivity"),
    ("self-development", "personal growth"),
];

const RELATED_PER_TERM: usize = 2;
const MAX_FALLBACK_QUERIES: usize = 3;

#[derive(Debug, Clone)]
pub struct QueryExpander {
    relations: Vec<(String, Vec<String>)>,
    synonyms: Vec<(String, String)>,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new(
            TERM_RELATIONS
                .iter()
                .map(|(term, related)| {
                    (
                        term.to_string(),
                        related.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect(),
            SYNONYMS
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        )
    }
}

impl QueryExpander {
    pub fn new(relations: Vec<(String, Vec<String>)>, synonyms: Vec<(String, String)>) -> Self {
        Self {
            relations,
            synonyms,
        }
    }

    /// Returns the original query followed by up to `max_expansions` variants.
    pub fn expand(&self, query: &str, max_expansions: usize) -> Vec<String> {
        let mut queries = vec![query.to_string()];
        let lower = query.to_lowercase();
        let mut added = 0;

        for (term, related) in &self.relations {
            if added >= max_expansions {
                break;
            }
            if !lower.contains(term.as_str()) {
                continue;
            }
            for related_term in related.iter().take(RELATED_PER_TERM) {
                if added >= max_expansions {
                    break;
                }
                let expanded = format!("{query} {related_term}");
                if !queries.contains(&expanded) {
                    debug!(term = %term, related = %related_term, "Query expanded");
                    queries.push(expanded);
                    added += 1;
                }
            }
        }

        for (original, synonym) in &self.synonyms {
            if added >= max_expansions {
                break;
            }
            if !lower.contains(original.as_str()) {
                continue;
            }
            let expanded = lower.replace(original.as_str(), synonym);
            if expanded != lower && !queries.iter().any(|q| q.to_lowercase() == expanded) {
                debug!(synonym = %synonym, "Query expanded with synonym");
                queries.push(expanded);
                added += 1;
            }
        }

        queries
    }

    /// Known concepts mentioned in `query`, in table order.
    pub fn key_concepts(&self, query: &str) -> Vec<&str> {
        let lower = query.to_lowercase();
        self.relations
            .iter()
            .filter(|(term, _)| lower.contains(term.as_str()))
            .map(|(term, _)| term.as_str())
            .collect()
    }

    /// Related terms of a known concept, empty for anything else.
    pub fn related(&self, concept: &str) -> &[String] {
        self.relations
            .iter()
            .find(|(term, _)| term == concept)
            .map(|(_, related)| related.as_slice())
            .unwrap_or(&[])
    }

    /// Narrower queries for when the main pass found nothing: each concept on
    /// its own, then their closest related terms, then the query's long words.
    pub fn fallback_queries(&self, query: &str, tried: &[String]) -> Vec<String> {
        let tried: Vec<String> = tried.iter().map(|q| q.to_lowercase()).collect();
        let mut out: Vec<String> = Vec::new();
        let push = |candidate: String, out: &mut Vec<String>| {
            let lower = candidate.to_lowercase();
            if !candidate.is_empty() && !tried.contains(&lower) && !out.contains(&candidate) {
                out.push(candidate);
            }
        };

        let concepts = self.key_concepts(query);
        for concept in &concepts {
            push(concept.to_string(), &mut out);
        }
        for concept in &concepts {
            for term in self.related(concept).iter().take(RELATED_PER_TERM) {
                push(term.clone(), &mut out);
            }
        }

        let simple: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphabetic())
            .filter(|w| w.chars().count() >= 5)
            .take(3)
            .map(str::to_string)
            .collect();
        push(simple.join(" "), &mut out);

        out.truncate(MAX_FALLBACK_QUERIES);
        out
    }
}
