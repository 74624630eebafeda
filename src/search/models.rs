

use serde::{Deserialize, Serialize};


pub const NOT_AVAILABLE: &str = "N/A";


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {

    pub pmid: String,

    pub title: String,

    pub authors: Vec<String>,

    pub year: String,

    pub journal: String,
}

impl BibliographicRecord {

    pub fn author_line(&self) -> String {
        if self.authors.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            self.authors.join(", ")
        }
    }


    pub fn has_year(&self) -> bool {
        self.year != NOT_AVAILABLE
    }
}
