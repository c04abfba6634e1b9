use crate::credential::Credential;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("len: {count}: {fields:?}")]
    FieldCount { count: usize, fields: Vec<String> },
}

impl SplitError {
    fn from_fields(fields: &[&str]) -> Self {
        SplitError::FieldCount {
            count: fields.len(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Recover an (email, password) pair from one decoded line.
///
/// Colon first. Only when the line has no colon at all is the whole line
/// retried with `;` and then with `,`. The first two-way split wins even if a
/// later delimiter would have parsed the line differently, so a password
/// containing `;` in a colon-less line is cut at that `;`.
pub fn split_line(line: &str) -> Result<Credential, SplitError> {
    let fields: Vec<&str> = line.split(':').collect();
    match fields.as_slice() {
        [email, password] => Ok(Credential::new(email, password)),
        [single] => {
            if let Some((email, password)) = split_exactly_two(single, ';') {
                return Ok(Credential::new(email, password));
            }
            if let Some((email, password)) = split_exactly_two(single, ',') {
                return Ok(Credential::new(email, password));
            }
            Err(SplitError::from_fields(&fields))
        }
        _ => Err(SplitError::from_fields(&fields)),
    }
}

fn split_exactly_two(s: &str, delimiter: char) -> Option<(&str, &str)> {
    let (left, right) = s.split_once(delimiter)?;
    if right.contains(delimiter) {
        return None;
    }
    Some((left, right))
}
