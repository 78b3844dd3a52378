use crate::{
    Domain, EvaluationTask, Evidence, Persona, QualityDimension, ResearchOutput,
    VerifiableStatement,
};

/// Prompt builders for every evaluation call
pub struct EvaluationPrompts;

impl EvaluationPrompts {
    pub fn build_personas_prompt(domain: Domain, count: usize) -> String {
        format!(
            r#"You are designing realistic people who would commission deep web research.

Create {count} distinct personas working in the **{domain}** domain. Vary their roles, expertise levels (novice, intermediate, expert) and the constraints they work under (budget, deadlines, regulation, audience).

For each persona list concrete information needs that would require up-to-date research rather than textbook knowledge."#,
            count = count,
            domain = domain,
        )
    }

    pub fn build_tasks_prompt(persona: &Persona, count: usize) -> String {
        format!(
            r#"Write {count} research tasks that the following person would realistically ask a research assistant to complete.

## Persona
- Name: {name}
- Role: {role}
- Domain: {domain}
- Expertise: {expertise}
- Information needs: {needs}
- Constraints: {constraints}

Each task needs a precise objective, explicit requirements, the expected output format and a difficulty (basic, intermediate or advanced). Prefer questions whose answers depend on recent events, current figures or evolving practice."#,
            count = count,
            name = persona.name,
            role = persona.role,
            domain = persona.domain,
            expertise = persona.expertise.as_str(),
            needs = bullet_inline(&persona.information_needs),
            constraints = bullet_inline(&persona.constraints),
        )
    }

    pub fn build_recency_prompt(task: &EvaluationTask) -> String {
        format!(
            r#"Decide whether answering this research task well requires current information.

## Task
{objective}

## Requirements
{requirements}

Answer whether recent information (published in roughly the last year) is required, and rate how important recency is from 0.0 (timeless) to 1.0 (meaningless without the latest data). Explain your reasoning in one or two sentences."#,
            objective = task.objective,
            requirements = bullet_list(&task.requirements),
        )
    }

    pub fn build_necessity_prompt(task: &EvaluationTask) -> String {
        format!(
            r#"Rate how much web search would improve the answer to this research task.

## Task
{objective}

## Requirements
{requirements}

## Requester
{persona}

Give a necessity score from 0.0 (a capable model can answer fully from memory) to 1.0 (impossible to answer well without searching the web). Explain your reasoning."#,
            objective = task.objective,
            requirements = bullet_list(&task.requirements),
            persona = task.persona.describe(),
        )
    }

    pub fn build_dimensions_prompt(task: &EvaluationTask, max_dimensions: usize) -> String {
        format!(
            r#"You are designing a grading rubric for a research report.

## Research Objective
{objective}

## Requirements
{requirements}

## Expected Format
{format}

Every report is already graded on Coverage, Insight, Instruction-Following and Clarity. Propose at most {max} additional dimensions that are specific to this task and not covered by those four. For each, give a name, a one-sentence description, a relative weight between 0 and 1, and rubric anchors for scores 1, 4, 7 and 10."#,
            objective = task.objective,
            requirements = bullet_list(&task.requirements),
            format = task.expected_format,
            max = max_dimensions,
        )
    }

    pub fn build_score_prompt(
        task: &EvaluationTask,
        output: &ResearchOutput,
        dimension: &QualityDimension,
    ) -> String {
        format!(
            r#"You are a strict research-report grader. Score the report on ONE dimension only.

## Dimension: {name}
{description}

## Rubric (1-10)
{rubric}

## Research Objective
{objective}

## Report
```markdown
{report}
```

Give an integer score from 1 to 10 against the rubric. Justify it, quote short passages from the report as evidence, and list concrete suggestions that would raise the score."#,
            name = dimension.name,
            description = dimension.description,
            rubric = dimension.render_rubric(),
            objective = task.objective,
            report = truncate_output(&output.markdown, 30000),
        )
    }

    pub fn build_assessment_prompt(task: &EvaluationTask, scores: &[(String, u8, String)]) -> String {
        let lines = scores
            .iter()
            .map(|(name, score, reasoning)| format!("- {} ({}/10): {}", name, score, reasoning))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            r#"Summarise the quality of a research report from its per-dimension grades.

## Research Objective
{objective}

## Dimension Grades
{lines}

Write a short overall summary, the report's main strengths, its main weaknesses, and the improvements that would matter most, in priority order."#,
            objective = task.objective,
            lines = lines,
        )
    }

    pub fn build_extraction_prompt(output: &ResearchOutput, max_statements: usize) -> String {
        format!(
            r#"Extract verifiable factual statements from this research report.

## Report
```markdown
{report}
```

Return at most {max} statements, most important first: prioritise claims that are central to the report's findings. Only include claims that can be checked against public web sources (numbers, dates, named entities, causal or comparative claims). For each give the exact claim, its type, the section it appears in, how confident you are that it is verifiable (0.0-1.0), a web search query that would verify it, and the line number if you can tell."#,
            report = truncate_output(&output.markdown, 30000),
            max = max_statements,
        )
    }

    pub fn build_search_queries_prompt(statement: &VerifiableStatement) -> String {
        format!(
            r#"Write web search queries that would find authoritative sources to verify this claim:

"{text}"

Return two or three short, specific queries."#,
            text = statement.text,
        )
    }

    pub fn build_evidence_prompt(statement: &VerifiableStatement, title: &str, body: &str) -> String {
        format!(
            r#"Assess whether a web page supports or contradicts a claim.

## Claim
{claim}

## Page: {title}
```
{body}
```

Classify the page's stance as strong_support, support, neutral, contradict or strong_contradict. Quote the most relevant passage (leave it empty if nothing on the page bears on the claim) and rate the source's credibility from 0.0 to 1.0."#,
            claim = statement.text,
            title = title,
            body = truncate_output(body, 8000),
        )
    }

    pub fn build_verification_prompt(
        statement: &VerifiableStatement,
        evidence: &[Evidence],
        confidence_threshold: f64,
    ) -> String {
        let evidence_block = evidence
            .iter()
            .enumerate()
            .map(|(i, e)| {
                format!(
                    "### Source {n}: {title}\n- URL: {url}\n- Support: {support}\n- Credibility: {cred:.2}\n- Excerpt: {text}",
                    n = i + 1,
                    title = e.title,
                    url = e.source_url,
                    support = e.support_level.as_str(),
                    cred = e.credibility(),
                    text = truncate_output(&e.relevant_text, 1500),
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            r#"Decide whether a factual claim is correct given the evidence below.

## Claim
{claim}

## Evidence
{evidence}

Give a verdict: correct, incorrect, partially_correct or unknown. Only answer correct or incorrect when your confidence is at least {threshold:.2}; otherwise prefer partially_correct or unknown. Weigh credible sources more heavily. Explain the verdict, and if the claim is incorrect or partially correct, state the corrected claim."#,
            claim = statement.text,
            evidence = evidence_block,
            threshold = confidence_threshold,
        )
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "(none stated)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bullet_inline(items: &[String]) -> String {
    if items.is_empty() {
        "(none stated)".to_string()
    } else {
        items.join("; ")
    }
}

/// Truncate to at most `max_len` bytes, preferring a line boundary
pub fn truncate_output(output: &str, max_len: usize) -> &str {
    if output.len() <= max_len {
        return output;
    }
    let mut end = max_len;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    match output[..end].rfind('\n') {
        Some(pos) => &output[..pos],
        None => &output[..end],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExpertiseLevel, StatementType, SupportLevel};

    #[test]
    fn test_truncate_output_prefers_line_boundary() {
        assert_eq!(truncate_output("short", 100), "short");
        assert_eq!(truncate_output("line one\nline two", 12), "line one");
        assert_eq!(truncate_output("abcdef", 3), "abc");
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_output("aéb", 2), "a");
    }

    #[test]
    fn test_tasks_prompt_mentions_persona() {
        let persona = Persona::new("Ravi", Domain::Finance, "Analyst", ExpertiseLevel::Expert)
            .with_information_needs(vec!["bond yields".into()]);
        let prompt = EvaluationPrompts::build_tasks_prompt(&persona, 3);
        assert!(prompt.contains("Write 3 research tasks"));
        assert!(prompt.contains("bond yields"));
        assert!(prompt.contains("(none stated)"));
    }

    #[test]
    fn test_verification_prompt_lists_every_source() {
        let statement = VerifiableStatement::new("GDP grew 2%", StatementType::Numeric, "", 0.9);
        let evidence = vec![
            Evidence::new("https://a.example", "A", "grew 2.1%", SupportLevel::Support, 0.9),
            Evidence::new("https://b.example", "B", "shrank", SupportLevel::Contradict, 0.4),
        ];
        let prompt = EvaluationPrompts::build_verification_prompt(&statement, &evidence, 0.7);
        assert!(prompt.contains("### Source 1: A"));
        assert!(prompt.contains("- Support: contradict"));
        assert!(prompt.contains("at least 0.70"));
    }
}
