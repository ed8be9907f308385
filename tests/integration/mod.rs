mod end_to_end;
mod pipeline_flow;
