use std::io::{Read, Write};

use crate::error::Result;

/// A run of consecutive records anchored at the file location of the first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JasixNode
{
    pub start: i32,
    pub end: i32,
    pub file_location: u64,
    pub count: usize,
}

impl JasixNode
{
    pub fn new(start: i32, end: i32, file_location: u64) -> Self
    {
        JasixNode {
            start,
            end,
            file_location,
            count: 1,
        }
    }

    pub fn overlaps(&self, start: i32, end: i32) -> bool
    {
        self.start <= end && self.end >= start
    }

    pub(crate) fn encode<W: Write>(&self, mut out_buf: &mut W) -> Result<()>
    {
        let bincode_config = bincode::config::standard();
        bincode::encode_into_std_write(self.start, &mut out_buf, bincode_config)?;
        bincode::encode_into_std_write(self.end - self.start, &mut out_buf, bincode_config)?;
        bincode::encode_into_std_write(self.file_location, &mut out_buf, bincode_config)?;
        Ok(())
    }

    pub(crate) fn decode<R: Read>(mut in_buf: &mut R) -> Result<Self>
    {
        let bincode_config = bincode::config::standard();
        let start: i32 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
        let span: i32 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
        let file_location: u64 = bincode::decode_from_std_read(&mut in_buf, bincode_config)?;
        Ok(JasixNode::new(start, start.saturating_add(span), file_location))
    }
}

/// Accumulates sorted records into nodes. Only the last node is open.
#[derive(Debug, Clone)]
pub struct NodeBuilder
{
    max_node_width: i32,
    preferred_node_count: usize,
    open: Option<JasixNode>,
    nodes: Vec<JasixNode>,
}

impl NodeBuilder
{
    pub fn new(max_node_width: i32, preferred_node_count: usize) -> Self
    {
        NodeBuilder {
            max_node_width,
            preferred_node_count,
            open: None,
            nodes: Vec::new(),
        }
    }

    fn absorbs(&self, node: &JasixNode, start: i32, end: i32) -> bool
    {
        if start < node.start {
            return false;
        }
        let width = node.end.max(end) as i64 - node.start as i64;
        let gap = start as i64 - node.end as i64;
        width <= self.max_node_width as i64
            || (node.count < self.preferred_node_count && gap <= self.max_node_width as i64)
    }

    pub fn add(&mut self, start: i32, end: i32, file_location: u64)
    {
        match self.open.take() {
            Some(mut node) if self.absorbs(&node, start, end) => {
                node.end = node.end.max(end);
                node.count += 1;
                self.open = Some(node);
            }
            Some(node) => {
                self.nodes.push(node);
                self.open = Some(JasixNode::new(start, end, file_location));
            }
            None => self.open = Some(JasixNode::new(start, end, file_location)),
        }
    }

    /// Closes the open node
    pub fn finish(mut self) -> Vec<JasixNode>
    {
        if let Some(node) = self.open.take() {
            self.nodes.push(node);
        }
        self.nodes
    }
}
