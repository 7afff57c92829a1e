use tracing::{info, warn};
use uuid::Uuid;

use super::StudyController;
use crate::domain::{BuildStatus, NodeContext, ReceiverToken};
use crate::engine::BuildRequest;
use crate::error::{StudyError, StudyResult};
use crate::notification::{StudyNotification, UpdateType};

impl StudyController {
    pub fn build_status(&self, ctx: NodeContext) -> StudyResult<BuildStatus> {
        self.repos.tree.node(ctx.study_id, ctx.node_id)?;
        Ok(self
            .repos
            .root_networks
            .get(ctx.node_id, ctx.root_network_id)?
            .build_status)
    }

    /// Requests the variant of a node on one root network. The node's parent
    /// must already be built; the builder replays the node's modifications on
    /// a copy of the parent variant and answers on the `build.*` destinations.
    pub async fn build(&self, ctx: NodeContext, user_id: &str) -> StudyResult<BuildStatus> {
        let node = self.repos.tree.node(ctx.study_id, ctx.node_id)?;
        let root_network = self
            .repos
            .root_networks
            .root_network(ctx.study_id, ctx.root_network_id)?;
        if node.stashed {
            return Err(StudyError::forbidden(
                "NODE_STASHED",
                format!("node {} is stashed", node.id),
            ));
        }
        let Some(parent_id) = node.parent_id else {
            return self.build_status(ctx);
        };
        let parent = self.repos.root_networks.get(parent_id, ctx.root_network_id)?;
        if !parent.build_status.is_built() {
            return Err(StudyError::forbidden(
                "PARENT_NOT_BUILT",
                format!("parent {} of node {} is {}", parent_id, node.id, parent.build_status),
            ));
        }

        // Only one caller moves the record to BUILDING
        let claimed = self
            .repos
            .root_networks
            .update(ctx.node_id, ctx.root_network_id, |info| {
                if matches!(info.build_status, BuildStatus::Built | BuildStatus::Building) {
                    return Err(info.build_status);
                }
                let stale = info.clone();
                info.take_results();
                info.build_status = BuildStatus::Building;
                Ok(stale)
            })?;
        let stale = match claimed {
            Ok(stale) => stale,
            Err(status) => return Ok(status),
        };
        self.publish_build_status(ctx, Some(user_id));

        // Anything derived from the previous variant of this node is stale
        let destination_variant_id = stale.variant_id.clone();
        self.invalidation.discard_records([stale]);
        self.invalidation
            .invalidate(ctx.study_id, &node.children, Some(&[ctx.root_network_id][..]))?;

        let request = BuildRequest {
            network_ref: root_network.network_ref,
            receiver: ReceiverToken::new(ctx.node_id, ctx.root_network_id, user_id).encode()?,
            origin_variant_id: parent.variant_id,
            destination_variant_id,
            modification_group_uuids: node.modification_group.into_iter().collect(),
            report_uuid: Uuid::new_v4(),
        };
        if let Err(error) = self.builder.build(&request).await {
            warn!(node_id = %ctx.node_id, root_network_id = %ctx.root_network_id, %error, "build request rejected");
            self.set_build_status(ctx, BuildStatus::NotBuilt, Some(user_id))?;
            return Err(error.into());
        }
        info!(
            node_id = %ctx.node_id,
            root_network_id = %ctx.root_network_id,
            origin = %request.origin_variant_id,
            "build requested"
        );
        Ok(BuildStatus::Building)
    }

    /// The status only changes once the builder confirms with `build.stopped`
    pub async fn stop_build(&self, ctx: NodeContext, user_id: &str) -> StudyResult<()> {
        self.repos.tree.node(ctx.study_id, ctx.node_id)?;
        let status = self.build_status(ctx)?;
        if status != BuildStatus::Building {
            return Ok(());
        }
        let receiver = ReceiverToken::new(ctx.node_id, ctx.root_network_id, user_id).encode()?;
        self.builder.stop_build(&receiver).await?;
        info!(node_id = %ctx.node_id, root_network_id = %ctx.root_network_id, "build stop requested");
        Ok(())
    }

    fn set_build_status(&self, ctx: NodeContext, status: BuildStatus, user_id: Option<&str>) -> StudyResult<()> {
        let previous = self
            .repos
            .root_networks
            .update_build_status(ctx.node_id, ctx.root_network_id, status)?;
        if previous != status {
            self.publish_build_status(ctx, user_id);
        }
        Ok(())
    }

    fn publish_build_status(&self, ctx: NodeContext, user_id: Option<&str>) {
        let mut notification = StudyNotification::for_node(
            ctx.study_id,
            ctx.node_id,
            ctx.root_network_id,
            UpdateType::BuildStatus,
        );
        if let Some(user) = user_id {
            notification = notification.with_user(user);
        }
        self.notifier.publish(notification);
    }
}
