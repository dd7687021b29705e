use std::io::{Read, Write};

use super::node::{JasixNode, NodeBuilder};
use crate::{
    error::{Error, Result},
    interval::{Interval, IntervalArray},
    parameters::Parameters,
    utils::neighbor_candidates,
};

const MAX_PREALLOCATE: usize = 1 << 16;

/// Write side of one chromosome
#[derive(Debug, Clone)]
pub struct ChrIndexBuilder
{
    name: String,
    large_variant_threshold: i32,
    nodes: NodeBuilder,
    large_variants: Vec<Interval<u64>>,
}

impl ChrIndexBuilder
{
    pub fn new<S: Into<String>>(name: S, parameters: &Parameters) -> Self
    {
        ChrIndexBuilder {
            name: name.into(),
            large_variant_threshold: parameters.large_variant_threshold,
            nodes: NodeBuilder::new(parameters.max_node_width, parameters.preferred_node_count),
            large_variants: Vec::new(),
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn add(&mut self, start: i32, end: i32, file_location: u64) -> Result<()>
    {
        if start > end {
            return Err(Error::input(format!(
                "record on {} starts after it ends: {} > {}",
                self.name, start, end
            )));
        }

        if end as i64 - start as i64 + 1 > self.large_variant_threshold as i64 {
            self.large_variants.push(Interval::new(start, end, file_location));
            // Large variants only occupy their start in the node stream
            self.nodes.add(start, start, file_location);
        } else {
            self.nodes.add(start, end, file_location);
        }
        Ok(())
    }

    pub fn finish(self) -> JasixChrIndex
    {
        let nodes = self.nodes.finish();
        log::info!(
            "Indexed {}: {} nodes, {} large variants",
            self.name,
            nodes.len(),
            self.large_variants.len()
        );
        JasixChrIndex::new(self.name, nodes, IntervalArray::new(self.large_variants))
    }
}

/// Read side of one chromosome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JasixChrIndex
{
    name: String,
    nodes: Vec<JasixNode>,
    /// Running maximum of node ends
    max_end: Vec<i32>,
    large_variants: IntervalArray<u64>,
}

impl JasixChrIndex
{
    fn new(name: String, nodes: Vec<JasixNode>, large_variants: IntervalArray<u64>) -> Self
    {
        let max_end = nodes
            .iter()
            .scan(i32::MIN, |running, n| {
                *running = (*running).max(n.end);
                Some(*running)
            })
            .collect();
        JasixChrIndex {
            name,
            nodes,
            max_end,
            large_variants,
        }
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn nodes(&self) -> &[JasixNode]
    {
        &self.nodes
    }

    pub fn large_variant_count(&self) -> usize
    {
        self.large_variants.len()
    }

    /// File location of the first node overlapping `[start, end]`
    pub fn first_small_variant(&self, start: i32, end: i32) -> Option<u64>
    {
        let insertion = self.nodes.partition_point(|n| n.start < start);

        // A wide node further back can reach past its neighbors
        let reach = self.max_end[..insertion].partition_point(|e| *e < start);
        if reach + 1 < insertion {
            return Some(self.nodes[reach].file_location);
        }

        neighbor_candidates(insertion, self.nodes.len())
            .map(|i| &self.nodes[i])
            .find(|n| n.overlaps(start, end))
            .map(|n| n.file_location)
    }

    /// File locations of every large variant overlapping `[begin, end]`,
    /// in start order
    pub fn large_variants(&self, begin: i32, end: i32) -> Vec<u64>
    {
        self.large_variants
            .overlapping(begin, end)
            .map(|i| i.value)
            .collect()
    }

    pub(crate) fn encode<W: Write>(&self, mut out_buf: &mut W) -> Result<()>
    {
        let bincode_config = bincode::config::standard();
        bincode::encode_into_std_write(&self.name, &mut out_buf, bincode_config)?;

        bincode::encode_into_std_write(self.nodes.len() as u64, &mut out_buf, bincode_config)?;
        for node in &self.nodes {
            node.encode(out_buf)?;
        }

        bincode::encode_into_std_write(self.large_variants.len() as u64, &mut out_buf, bincode_config)?;
        for interval in self.large_variants.iter() {
            bincode::encode_into_std_write(interval.begin, &mut out_buf, bincode_config)?;
            bincode::encode_into_std_write(interval.end, &mut out_buf, bincode_config)?;
            bincode::encode_into_std_write(interval.value, &mut out_buf, bincode_config)?;
        }
        Ok(())
    }

    pub(crate) fn decode<R: Read>(mut in_buf: &mut R) -> Result<Self>
    {
        let bincode_config = bincode::config::standard();
        let name: String = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;

        let node_count: u64 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
        let mut nodes = Vec::with_capacity((node_count as usize).min(MAX_PREALLOCATE));
        for _ in 0..node_count {
            nodes.push(JasixNode::decode(in_buf)?);
        }
        if !nodes.windows(2).all(|w| w[0].start <= w[1].start) {
            return Err(Error::format(format!("nodes of {} are not sorted", name)));
        }

        let interval_count: u64 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
        let mut intervals = Vec::with_capacity((interval_count as usize).min(MAX_PREALLOCATE));
        for _ in 0..interval_count {
            let begin: i32 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
            let end: i32 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
            let file_location: u64 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
            intervals.push(Interval::new(begin, end, file_location));
        }

        Ok(JasixChrIndex::new(name, nodes, IntervalArray::new(intervals)))
    }
}
