use std::collections::HashSet;

/// scikit-learn's English stopword list.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Tokens this short (in bytes, after stripping to ASCII) are dropped.
const MAX_DROPPED_LEN: usize = 2;

const IRREGULAR: &[(&str, &str)] = &[
    ("bought", "buy"),
    ("broke", "break"),
    ("broken", "break"),
    ("changed", "change"),
    ("changing", "change"),
    ("children", "child"),
    ("cookies", "cookie"),
    ("died", "die"),
    ("dying", "die"),
    ("feet", "foot"),
    ("felt", "feel"),
    ("gave", "give"),
    ("gone", "go"),
    ("got", "get"),
    ("kept", "keep"),
    ("left", "leave"),
    ("lied", "lie"),
    ("lying", "lie"),
    ("made", "make"),
    ("men", "man"),
    ("mice", "mouse"),
    ("movies", "movie"),
    ("paid", "pay"),
    ("people", "person"),
    ("purchased", "purchase"),
    ("ran", "run"),
    ("said", "say"),
    ("selfies", "selfie"),
    ("sent", "send"),
    ("took", "take"),
    ("teeth", "tooth"),
    ("thought", "think"),
    ("used", "use"),
    ("using", "use"),
    ("went", "go"),
    ("women", "woman"),
    ("wore", "wear"),
    ("worn", "wear"),
];

const INVARIANT: &[&str] = &[
    "always", "analysis", "basis", "bleed", "bonus", "canvas", "chassis", "embed", "feed", "gas",
    "indeed", "ios", "less", "lens", "need", "news", "perhaps", "plus", "seed", "series",
    "species", "speed", "status", "wireless",
];

/// Maps an inflected token to its dictionary form.
pub trait Lemmatizer: Send + Sync {
    fn lemmatize(&self, token: &str) -> String;
}

/// Rule-based English lemmatizer: an irregular-form table plus plural,
/// `-ed` and `-ing` suffix rules. Rules are applied until the token stops
/// changing, so every output is a fixed point.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnglishLemmatizer;

impl Lemmatizer for EnglishLemmatizer {
    fn lemmatize(&self, token: &str) -> String {
        let mut current = token.to_string();
        loop {
            let next = lemma_step(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

fn lemma_step(word: &str) -> String {
    if let Some((_, base)) = IRREGULAR.iter().find(|(form, _)| *form == word) {
        return (*base).to_string();
    }
    if word.len() <= 3 || INVARIANT.contains(&word) || !word.is_ascii() {
        return word.to_string();
    }

    if let Some(stem) = word.strip_suffix("ies") {
        if word.len() > 4 {
            return format!("{stem}y");
        }
    }
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    for suffix in ["ches", "shes", "xes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !["ss", "us", "is", "ous"].iter().any(|s| word.ends_with(s)) {
        return word[..word.len() - 1].to_string();
    }

    if let Some(stem) = word.strip_suffix("ied") {
        if word.len() > 4 {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = word.strip_suffix("ed") {
        if is_restorable(stem) {
            return restore_stem(stem);
        }
    }
    if let Some(stem) = word.strip_suffix("ing") {
        if is_restorable(stem) {
            return restore_stem(stem);
        }
    }

    word.to_string()
}

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u')
}

fn is_restorable(stem: &str) -> bool {
    stem.len() >= 3 && stem.bytes().any(|b| is_vowel(b) || b == b'y')
}

fn restore_stem(stem: &str) -> String {
    let bytes = stem.as_bytes();
    let n = bytes.len();
    let last = bytes[n - 1];
    if last == bytes[n - 2] && !is_vowel(last) && !matches!(last, b'l' | b's' | b'z') {
        return stem[..n - 1].to_string();
    }
    if needs_silent_e(bytes) {
        format!("{stem}e")
    } else {
        stem.to_string()
    }
}

fn needs_silent_e(b: &[u8]) -> bool {
    let n = b.len();
    let last = b[n - 1];
    let prev = b[n - 2];

    if matches!(last, b'v' | b'z' | b'c') {
        return true;
    }
    if matches!(&b[n - 2..], b"rg" | b"dg" | b"bl" | b"iz") {
        return true;
    }
    if &b[n - 2..] == b"at" && !is_vowel(b[n - 3]) {
        return true;
    }
    if b.ends_with(b"eas") || b.ends_with(b"has") {
        return true;
    }
    if matches!(&b[n - 2..], b"ar" | b"ir" | b"ur") && !is_vowel(b[n - 3]) {
        return true;
    }
    if n <= 4 && &b[n - 2..] == b"or" {
        return true;
    }
    n == 3 && !is_vowel(b[0]) && is_vowel(prev) && !is_vowel(last) && !matches!(last, b'w' | b'x' | b'y')
}

/// Turns raw review text into a cleaned, lemmatized document.
pub struct Normalizer {
    stop_words: HashSet<String>,
    lemmatizer: Box<dyn Lemmatizer>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(ENGLISH_STOP_WORDS.iter().copied(), Box::new(EnglishLemmatizer))
    }
}

impl Normalizer {
    pub fn new<I, S>(stop_words: I, lemmatizer: Box<dyn Lemmatizer>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_words: stop_words.into_iter().map(Into::into).collect(),
            lemmatizer,
        }
    }

    fn keeps(&self, token: &str) -> bool {
        token.len() > MAX_DROPPED_LEN && !self.stop_words.contains(token)
    }

    /// Lowercase, strip to `[a-z\s]`, lemmatize, and drop stopwords and short
    /// tokens. Both the surface token and its lemma must survive the filter.
    pub fn normalize(&self, raw: &str) -> String {
        let stripped: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_whitespace())
            .collect();

        stripped
            .split_whitespace()
            .filter(|token| self.keeps(token))
            .map(|token| self.lemmatizer.lemmatize(token))
            .filter(|lemma| self.keeps(lemma))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
