


pub const PICOS_SYSTEM_PROMPT: &str = "You are an expert in medical information retrieval. \
Always respond with valid JSON.";


pub const SYNONYM_SYSTEM_PROMPT: &str = "You are a medical terminology expert. \
Always respond with valid JSON.";


pub fn build_picos_prompt(topic: &str) -> String {
    format!(
        r#"Decompose the research topic below into the PICOS framework and produce English search keywords.

Return one or more short keyword phrases per element, strictly in this JSON format:
{{
  "P": ["participants / patients / population"],
  "I": ["intervention or exposure"],
  "C": ["comparator or control condition"],
  "O": ["outcome measures"],
  "S": ["study design"]
}}

Use an empty list for an element the topic does not mention. Do not add commentary.

Research topic: {topic}"#
    )
}


pub fn build_synonym_prompt(phrase: &str) -> String {
    format!(
        r#"Generate several synonyms or closely related English search terms for the medical keyword below.

Keyword: {phrase}

Respond strictly in this JSON format:
{{
  "synonyms": ["synonym 1", "synonym 2", "synonym 3"]
}}"#
    )
}
