use crate::chunker::{sections, table};

const QUESTION_PREFIXES: &[&str] = &["question:", "q:", "q.", "प्रश्न:"];
const ANSWER_PREFIXES: &[&str] = &["answer:", "a:", "a.", "उत्तर:"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn render(&self) -> String {
        format!("Q: {}\nA: {}", self.question, self.answer)
    }
}

fn strip_prefix<'a>(line: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    let trimmed = line.trim();
    prefixes.iter().find_map(|prefix| {
        let head = trimmed.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix).then(|| trimmed[prefix.len()..].trim())
    })
}

pub fn question_text(line: &str) -> Option<&str> {
    strip_prefix(line, QUESTION_PREFIXES)
}

pub fn answer_text(line: &str) -> Option<&str> {
    strip_prefix(line, ANSWER_PREFIXES)
}

fn next_content_line<'a>(lines: &[&'a str], from: usize) -> Option<(usize, &'a str)> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index, *line))
}

/// True when a new question/answer pair begins at `index`.
pub fn starts_pair(lines: &[&str], index: usize) -> bool {
    let Some(line) = lines.get(index).map(|line| line.trim()) else {
        return false;
    };
    if question_text(line).is_some() {
        return true;
    }
    line.ends_with('?')
        && next_content_line(lines, index + 1).is_some_and(|(_, next)| answer_text(next).is_some())
}

/// Reads a question and its answer starting at `start`. Returns the pair and the number of
/// lines consumed. The answer runs until the next question, header or table.
pub fn detect(lines: &[&str], start: usize) -> Option<(QaPair, usize)> {
    if !starts_pair(lines, start) {
        return None;
    }
    let line = lines.get(start)?.trim();
    let question = question_text(line).unwrap_or(line).to_string();
    if question.is_empty() {
        return None;
    }

    let mut answer_lines: Vec<&str> = Vec::new();
    let mut cursor = start + 1;
    while let Some(raw) = lines.get(cursor) {
        let trimmed = raw.trim();
        let answer = answer_text(trimmed);
        let boundary = starts_pair(lines, cursor)
            || table::split_cells(raw).is_some()
            || (answer.is_none() && sections::header_label(trimmed).is_some());
        if boundary {
            break;
        }

        answer_lines.push(answer.unwrap_or(trimmed));
        cursor += 1;
    }

    let answer =
        answer_lines.into_iter().filter(|line| !line.is_empty()).collect::<Vec<_>>().join(" ");
    if answer.is_empty() {
        return None;
    }

    Some((QaPair { question, answer }, cursor - start))
}

#[cfg(test)]
mod tests {
    use super::detect;

    #[test]
    fn prefixed_pairs_stop_at_next_question() {
        let lines = [
            "Q: Can I prepay my home loan?",
            "A: Yes, floating rate loans carry no prepayment charge.",
            "Fixed rate loans may attract a fee.",
            "Q: What is the maximum tenure?",
            "A: Thirty years.",
        ];
        let (pair, consumed) = detect(&lines, 0).expect("first pair");
        assert_eq!(consumed, 3);
        assert_eq!(pair.question, "Can I prepay my home loan?");
        assert_eq!(
            pair.answer,
            "Yes, floating rate loans carry no prepayment charge. Fixed rate loans may attract a fee."
        );

        let (second, consumed) = detect(&lines, 3).expect("second pair");
        assert_eq!(consumed, 2);
        assert_eq!(second.answer, "Thirty years.");
    }

    #[test]
    fn bare_question_needs_an_answer_marker() {
        let lines = ["What documents are needed?", "Answer: PAN and address proof."];
        let (pair, _) = detect(&lines, 0).expect("pair");
        assert_eq!(pair.question, "What documents are needed?");
        assert_eq!(pair.answer, "PAN and address proof.");

        assert!(detect(&["Why choose us?", "Because we care."], 0).is_none());
    }

    #[test]
    fn hindi_markers_are_supported() {
        let lines = ["प्रश्न: एफडी की न्यूनतम अवधि क्या है?", "उत्तर: सात दिन।"];
        let (pair, _) = detect(&lines, 0).expect("pair");
        assert_eq!(pair.answer, "सात दिन।");
    }

    #[test]
    fn answer_ends_at_header() {
        let lines = ["Q: Is there a fee?", "A: No.", "", "ELIGIBILITY", "Salaried applicants."];
        let (pair, consumed) = detect(&lines, 0).expect("pair");
        assert_eq!(pair.answer, "No.");
        assert_eq!(consumed, 3);
    }
}
