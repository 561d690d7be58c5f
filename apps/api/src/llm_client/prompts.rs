//! Prompt construction for the CV-vs-JD fit analysis.

use crate::analysis::truncate_chars;

/// Inputs are truncated so the prompt stays well inside the context
/// budget even for long CVs.
const MAX_CV_PROMPT_CHARS: usize = 4500;
const MAX_JD_PROMPT_CHARS: usize = 2000;

pub const FIT_SYSTEM: &str = "You are a senior career coach and resume strategist \
specializing in ATS optimization. You analyze a CV against a job description and return \
only a single valid JSON object, with no markdown and no commentary.";

pub fn fit_prompt(cv_text: &str, jd_text: &str) -> String {
    format!(
        r#"Analyze the CV below against the job description (JD) in detail.

CV:
{cv}

JD:
{jd}

Requirements:
1. Score 10 metrics from 0-100 (weights must sum to 100): jobRelevance (20), summaryEffectiveness (8), experienceDepth (15), achievementImpact (12), technicalSkills (15), softSkills (8), additionalSkills (5), languageQuality (7), brandingPersonality (5), structureProfessionalism (5).
2. Assess the layout: fonts, whitespace, logical flow, ATS scanability.
3. Give an application recommendation: one of "Encouraged", "Very promising", "Needs consideration", "Not a fit", with reasoning.
4. Provide at least 6 improvements, each with before/after rewrite examples.
5. Provide three strategic tips: strategicMove, interviewTip, optimizationPriority.

Return exactly this JSON structure (no markdown, no extra text):

{{
  "overall_score": <0-100>,
  "verdict": "<one-sentence overall verdict>",
  "summary": "<2-3 sentence assessment>",
  "job_title": "<position from the JD>",
  "company_name": "<company from the JD, or 'Unknown'>",
  "app_recommendation": {{ "status": "<status>", "reasoning": "<why>" }},
  "layout_analysis": {{ "score": <0-100>, "feedback": "<layout feedback>", "tips": ["<tip>", "<tip>", "<tip>"] }},
  "metrics": {{ "<metricKey>": {{ "score": <0-100>, "label": "<label>", "weight": <n>, "note": "<note>" }}, ... }},
  "recommendation": {{ "strategicMove": "<next step>", "interviewTip": "<tip>", "optimizationPriority": "<top priority>" }},
  "strengths": ["<strength>", ...],
  "weaknesses": ["<weakness>", ...],
  "matched_skills": ["<skill in both CV and JD>", ...],
  "missing_skills": ["<skill the JD wants but the CV lacks>", ...],
  "improvements": [
    {{
      "category": "<criterion>",
      "currentScore": <0-100>,
      "priority": "<high | medium | low>",
      "issue": "<specific problem>",
      "strategicAdvice": "<advice>",
      "actionSteps": ["<step>", "<step>", "<step>"],
      "rewrites": [{{ "original": "<line from the CV>", "improved": "<rewritten line>", "explanation": "<why it is better>" }}]
    }}
  ]
}}

Every improvement must include at least one rewrite example."#,
        cv = truncate_chars(cv_text, MAX_CV_PROMPT_CHARS),
        jd = truncate_chars(jd_text, MAX_JD_PROMPT_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_inputs_are_truncated() {
        let cv = "x".repeat(20_000);
        let jd = "y".repeat(20_000);
        let prompt = fit_prompt(&cv, &jd);
        assert!(prompt.len() < 12_000);
        assert!(prompt.contains(&"x".repeat(MAX_CV_PROMPT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(MAX_CV_PROMPT_CHARS + 1)));
    }
}
