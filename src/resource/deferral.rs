//! Values documents whose encoding hit a reference to a resource that was not declared yet.
//!
//! A deferred document is retried after every successful values encode until it resolves.
//! Whatever is still queued when the apk is finalized is reported as unresolved.

use std::fmt;

use crate::apk::ApkError;
use crate::resource::ResourceError;
use crate::table::config::ResConfig;
use crate::xml::XmlDocument;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// Virtual path of the document holding the reference.
    pub path: String,
    pub reference: String,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.reference, self.path)
    }
}

#[derive(Clone, Debug)]
pub struct DeferredDocument {
    pub path: String,
    pub config: ResConfig,
    pub type_name: String,
    pub document: XmlDocument,
    /// The reference that failed on the last attempt.
    pub reference: String,
}

impl DeferredDocument {
    fn is_for(&self, config: &ResConfig, type_name: &str) -> bool {
        self.config == *config && self.type_name == type_name
    }
}

#[derive(Debug, Default)]
pub struct DeferralQueue {
    documents: Vec<DeferredDocument>,
}

impl DeferralQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Queues `deferred`, replacing an older document for the same type and configuration.
    pub fn push(&mut self, deferred: DeferredDocument) {
        log::debug!(
            "Deferring {} until {} is declared",
            deferred.path,
            deferred.reference
        );
        match self
            .documents
            .iter_mut()
            .find(|queued| queued.is_for(&deferred.config, &deferred.type_name))
        {
            Some(queued) => *queued = deferred,
            None => self.documents.push(deferred),
        }
    }

    pub fn pending(&self, config: &ResConfig, type_name: &str) -> Option<&DeferredDocument> {
        self.documents
            .iter()
            .find(|queued| queued.is_for(config, type_name))
    }

    pub fn remove(&mut self, config: &ResConfig, type_name: &str) -> Option<DeferredDocument> {
        let position = self
            .documents
            .iter()
            .position(|queued| queued.is_for(config, type_name))?;
        Some(self.documents.remove(position))
    }

    /// Retries every queued document in order until one full pass resolves nothing.
    /// A failure other than an unresolved reference drops that document and is returned as
    /// an encode error of its path.
    pub fn retry<F>(&mut self, mut encode: F) -> Result<(), ApkError>
    where
        F: FnMut(&DeferredDocument) -> Result<(), ResourceError>,
    {
        loop {
            let mut progress = false;
            let mut queued = std::mem::take(&mut self.documents).into_iter();
            while let Some(mut deferred) = queued.next() {
                match encode(&deferred) {
                    Ok(()) => {
                        log::debug!("Resolved deferred {}", deferred.path);
                        progress = true;
                    }
                    Err(ResourceError::Reference { reference }) => {
                        deferred.reference = reference;
                        self.documents.push(deferred);
                    }
                    Err(source) => {
                        self.documents.extend(queued);
                        return Err(ApkError::Encode {
                            path: deferred.path,
                            source,
                        });
                    }
                }
            }
            if !progress || self.documents.is_empty() {
                return Ok(());
            }
        }
    }

    /// Empties the queue, reporting every document's missing reference.
    pub fn drain_unresolved(&mut self) -> Vec<UnresolvedReference> {
        self.documents
            .drain(..)
            .map(|deferred| UnresolvedReference {
                path: deferred.path,
                reference: deferred.reference,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlElement;
    use std::collections::HashSet;

    fn deferred(type_name: &str, reference: &str) -> DeferredDocument {
        DeferredDocument {
            path: format!("res/values/{type_name}s.xml"),
            config: ResConfig::default(),
            type_name: type_name.to_string(),
            document: XmlDocument::new(XmlElement::new("resources")),
            reference: reference.to_string(),
        }
    }

    #[test]
    fn test_push_replaces_same_block() {
        let mut queue = DeferralQueue::new();
        queue.push(deferred("string", "@string/a"));
        queue.push(deferred("string", "@string/b"));
        queue.push(deferred("style", "@style/c"));
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue.pending(&ResConfig::default(), "string").map(|d| d.reference.as_str()),
            Some("@string/b")
        );
    }

    #[test]
    fn test_retry_converges() -> Result<(), ApkError> {
        let mut queue = DeferralQueue::new();
        queue.push(deferred("style", "@color/accent"));
        queue.push(deferred("color", "@dimen/size"));

        // `color` resolves first, which unblocks `style` on the next pass.
        let mut declared = HashSet::new();
        queue.retry(|deferred| match deferred.type_name.as_str() {
            "color" => {
                declared.insert("color");
                Ok(())
            }
            _ if declared.contains("color") => Ok(()),
            _ => Err(ResourceError::reference("@color/accent")),
        })?;
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn test_retry_terminates_without_progress() -> Result<(), ApkError> {
        let mut queue = DeferralQueue::new();
        queue.push(deferred("string", "@string/missing"));

        let mut attempts = 0;
        queue.retry(|_| {
            attempts += 1;
            Err(ResourceError::reference("@string/missing"))
        })?;
        assert_eq!(attempts, 1);
        assert_eq!(
            queue.drain_unresolved(),
            vec![UnresolvedReference {
                path: "res/values/strings.xml".to_string(),
                reference: "@string/missing".to_string(),
            }]
        );
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn test_retry_reports_failing_path() {
        let mut queue = DeferralQueue::new();
        queue.push(deferred("string", "@string/a"));
        queue.push(deferred("color", "@color/b"));

        let result = queue.retry(|deferred| match deferred.type_name.as_str() {
            "string" => Err(ResourceError::InvalidDocument("broken".to_string())),
            _ => Err(ResourceError::reference("@color/b")),
        });
        assert!(matches!(result, Err(ApkError::Encode { path, .. }) if path == "res/values/strings.xml"));
        assert_eq!(queue.len(), 1);
    }
}
