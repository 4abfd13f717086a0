use crate::api::element::{Record, RecordCollection, StreamElement};
use crate::api::error::Result;
use crate::api::function::Process;

/// The fused processes of one segment.
///
/// Each link holds the link before it; `call` runs the predecessor first so
/// the innermost link sees the raw input. Records keep the event timestamp
/// of the input they were derived from; control elements pass through every
/// link unchanged and in order.
pub(crate) struct ChainedProcess {
    process: Box<dyn Process>,
    predecessor: Option<Box<ChainedProcess>>,
}

impl ChainedProcess {
    /// Link processes given in execution order.
    pub fn chain(processes: Vec<Box<dyn Process>>) -> Option<ChainedProcess> {
        let mut chained: Option<ChainedProcess> = None;
        for process in processes {
            chained = Some(ChainedProcess {
                process,
                predecessor: chained.map(Box::new),
            });
        }
        chained
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        1 + self.predecessor.as_ref().map(|x| x.len()).unwrap_or(0)
    }

    /// Process names in execution order.
    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        let mut names = match self.predecessor.as_ref() {
            Some(predecessor) => predecessor.names(),
            None => Vec::new(),
        };
        names.push(self.process.get_name().to_string());
        names
    }

    pub fn call(&mut self, collection: RecordCollection) -> Result<RecordCollection> {
        let input = match self.predecessor.as_mut() {
            Some(predecessor) => predecessor.call(collection)?,
            None => collection,
        };

        let mut output = RecordCollection::new();
        for element in input {
            match element {
                StreamElement::Record(record) => {
                    let timestamp = record.timestamp();
                    for value in self.process.process(record.into_value())? {
                        output.push(StreamElement::Record(Record::with_timestamp(
                            value, timestamp,
                        )));
                    }
                }
                control => output.push(control),
            }
        }
        Ok(output)
    }
}
