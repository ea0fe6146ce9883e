//! Day objects: one per calendar date, created lazily and never twice.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::debug;

use crate::error::{OptionExt, Result};
use crate::ids::IdGenerator;
use crate::oced::{DayObject, GraphObject, OcedGraph, TypeDefinition};

/// Resolves the day object a segment occurred on.
pub trait DayObjectFactory {
    /// Id of the day object for `date`, creating it in `graph` if needed.
    fn get_or_create_day(&mut self, graph: &mut OcedGraph, date: NaiveDate) -> Result<String>;
}

/// Day factory backed by the graph's own `day` objects.
///
/// Existing days are found by type and `date` attribute; missing days are
/// added with `date` and `day_of_week` attributes. The date index is a cache
/// over whichever graph is passed in: a cached id that does not resolve to the
/// same date in that graph triggers a rescan, so one factory can serve several
/// graphs.
#[derive(Debug)]
pub struct GraphDayFactory<I: IdGenerator> {
    ids: I,
    days: HashMap<NaiveDate, String>,
}

impl<I: IdGenerator> GraphDayFactory<I> {
    pub fn new(ids: I) -> Self {
        Self {
            ids,
            days: HashMap::new(),
        }
    }

    fn lookup(&mut self, graph: &OcedGraph, date: NaiveDate) -> Option<String> {
        let resolves = |id: &String| graph.object(id).and_then(GraphObject::day_date) == Some(date);
        if let Some(id) = self.days.get(&date).filter(|id| resolves(*id)) {
            return Some(id.clone());
        }

        self.days.clear();
        for object in graph.objects() {
            if let Some(day) = object.day_date() {
                self.days
                    .entry(day)
                    .or_insert_with(|| object.id().to_string());
            }
        }
        self.days.get(&date).cloned()
    }
}

impl<I: IdGenerator> DayObjectFactory for GraphDayFactory<I> {
    fn get_or_create_day(&mut self, graph: &mut OcedGraph, date: NaiveDate) -> Result<String> {
        if let Some(id) = self.lookup(graph, date) {
            return Ok(id);
        }

        let day = DayObject::new(self.ids.next_id(), date);
        let id = day.id.clone();
        graph
            .add_object(day)
            .then_some(())
            .ok_or_day(date, &format!("object id {} already taken", id))?;
        graph.ensure_object_type(TypeDefinition::day());
        self.days.insert(date, id.clone());
        debug!("[Days] Created day object {} for {}", id, date);
        Ok(id)
    }
}
