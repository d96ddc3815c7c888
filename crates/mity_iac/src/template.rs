//! Composition templates.
//!
//! A template is an ordered list of slots. Each slot first decides whether it
//! exists for an environment and in which variant, then populates its nodes.
//! Slot order must be a topological order of the edges the slots create: a
//! slot may only reference nodes of earlier slots (or earlier nodes of the
//! same slot).

use std::fmt;

use crate::environment::{FleetCapacity, ResolvedEnvironmentContext, TableBilling};
use crate::error::{ConfigError, IacResult};
use crate::graph::SlotScope;
use crate::model::{AttributeValue, ResourceKind, ResourceNode};

/// Whether a slot exists in an environment, and as which variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    Absent,
    Variant(SlotVariant),
}

/// Variant selected for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotVariant {
    Standard,
    OnDemand,
    Provisioned { read: u32, write: u32 },
    Fixed { desired: u32 },
    Autoscaling { min: u32, max: u32 },
}

pub type SelectFn = fn(&ResolvedEnvironmentContext) -> SlotDecision;
pub type PopulateFn = fn(&mut SlotScope<'_>, SlotVariant) -> IacResult<()>;

/// One position in a composition template.
#[derive(Clone)]
pub struct Slot {
    name: String,
    select: SelectFn,
    populate: PopulateFn,
}

impl Slot {
    pub fn new(name: impl Into<String>, select: SelectFn, populate: PopulateFn) -> Self {
        Self {
            name: name.into(),
            select,
            populate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decide(&self, context: &ResolvedEnvironmentContext) -> SlotDecision {
        (self.select)(context)
    }

    pub fn populate(&self, scope: &mut SlotScope<'_>, variant: SlotVariant) -> IacResult<()> {
        (self.populate)(scope, variant)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("name", &self.name).finish()
    }
}

/// Ordered list of slots instantiated once per environment.
#[derive(Debug, Clone, Default)]
pub struct CompositionTemplate {
    slots: Vec<Slot>,
}

impl CompositionTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(mut self, slot: Slot) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// The standard application topology: network, subnetworks, security
    /// boundaries, storage, optional database, identity, compute fleet and
    /// observability.
    pub fn standard() -> Self {
        Self::new()
            .slot(Slot::new("network", always, network))
            .slot(Slot::new("subnetworks", always, subnetworks))
            .slot(Slot::new("security_boundaries", always, security_boundaries))
            .slot(Slot::new("object_storage", always, object_storage))
            .slot(Slot::new("state_table", select_table, state_table))
            .slot(Slot::new("database", select_database, database))
            .slot(Slot::new("identity", always, identity))
            .slot(Slot::new("compute_fleet", select_fleet, compute_fleet))
            .slot(Slot::new("log_group", select_log_group, log_group))
            .slot(Slot::new("alarms", select_alarms, alarms))
            .slot(Slot::new("api_key", select_api_key, api_key))
    }
}

fn always(_: &ResolvedEnvironmentContext) -> SlotDecision {
    SlotDecision::Variant(SlotVariant::Standard)
}

fn when(enabled: bool) -> SlotDecision {
    if enabled {
        SlotDecision::Variant(SlotVariant::Standard)
    } else {
        SlotDecision::Absent
    }
}

fn select_table(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    SlotDecision::Variant(match ctx.features.table_billing {
        TableBilling::OnDemand => SlotVariant::OnDemand,
        TableBilling::Provisioned { read, write } => SlotVariant::Provisioned { read, write },
    })
}

fn select_database(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    when(ctx.features.database.is_some())
}

fn select_fleet(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    SlotDecision::Variant(match ctx.features.fleet {
        FleetCapacity::Fixed { desired } => SlotVariant::Fixed { desired },
        FleetCapacity::Autoscaling { min, max } => SlotVariant::Autoscaling { min, max },
    })
}

fn select_log_group(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    when(ctx.features.monitoring)
}

fn select_alarms(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    when(ctx.is_production() && ctx.features.alarms)
}

fn select_api_key(ctx: &ResolvedEnvironmentContext) -> SlotDecision {
    when(ctx.is_production() && ctx.features.api_key)
}

/// Data-bearing resources are retained in production and disposable elsewhere.
/// `retain_data` keeps them in any environment, which makes them non-ephemeral.
fn data_lifecycle(node: ResourceNode, ctx: &ResolvedEnvironmentContext) -> ResourceNode {
    let retain = ctx.is_production() || ctx.features.retain_data;
    node.retain_on_delete(retain).ephemeral(!retain)
}

fn network(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let cidr = scope.context().network.to_string();
    let node = scope
        .node(ResourceKind::Network, "Network", "AWS::EC2::VPC", "network")
        .attr("CidrBlock", cidr)
        .attr("EnableDnsSupport", true)
        .attr("EnableDnsHostnames", true);
    scope.add(node)?;
    scope.export("NetworkId", "Network identifier", "Network", "id", "network-id")
}

const SUBNETWORKS: [(&str, &str, bool); 4] = [
    ("PublicSubnetA", "public-a", true),
    ("PublicSubnetB", "public-b", true),
    ("PrivateSubnetA", "private-a", false),
    ("PrivateSubnetB", "private-b", false),
];

fn subnetworks(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let block = scope.context().network;
    for (index, (logical_id, base, public)) in SUBNETWORKS.iter().enumerate() {
        let cidr = block
            .subnet(2, index as u32)
            .ok_or_else(|| ConfigError::InvalidNetwork {
                environment: scope.context().name.clone(),
                message: format!("{} cannot hold subnetwork {}", block, base),
            })?;

        let mut node = scope
            .node(ResourceKind::Subnetwork, logical_id, "AWS::EC2::Subnet", base)
            .attr("CidrBlock", cidr.to_string())
            .attr("AvailabilityZoneIndex", (index % 2) as i64)
            .attr("MapPublicIpOnLaunch", *public);
        node.tags.insert("Tier".to_string(), if *public { "public" } else { "private" }.to_string());
        let vpc = scope.reference(&mut node, "Network", "id")?;
        node.set("VpcId", vpc);
        scope.add(node)?;
    }
    Ok(())
}

fn security_boundaries(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let mut web = scope.node(ResourceKind::SecurityBoundary, "WebSecurityGroup", "AWS::EC2::SecurityGroup", "web-sg");
    let vpc = scope.reference(&mut web, "Network", "id")?;
    let name = web.physical_name.clone();
    web = web
        .attr("GroupName", name)
        .attr("GroupDescription", "HTTPS from anywhere")
        .attr("VpcId", vpc)
        .attr(
            "Ingress",
            AttributeValue::list([AttributeValue::map([
                ("Protocol", AttributeValue::from("tcp")),
                ("Port", AttributeValue::from(443i64)),
                ("CidrIp", AttributeValue::from("0.0.0.0/0")),
            ])]),
        );
    scope.add(web)?;

    let mut data = scope.node(ResourceKind::SecurityBoundary, "DataSecurityGroup", "AWS::EC2::SecurityGroup", "data-sg");
    let vpc = scope.reference(&mut data, "Network", "id")?;
    let source = scope.reference(&mut data, "WebSecurityGroup", "id")?;
    let name = data.physical_name.clone();
    data = data
        .attr("GroupName", name)
        .attr("GroupDescription", "Data tier, reachable from the web tier only")
        .attr("VpcId", vpc)
        .attr(
            "Ingress",
            AttributeValue::list([AttributeValue::map([
                ("Protocol", AttributeValue::from("tcp")),
                ("Port", AttributeValue::from(5432i64)),
                ("SourceSecurityGroupId", AttributeValue::from(source)),
            ])]),
        );
    scope.add(data)
}

fn object_storage(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let ctx = scope.context();
    let node = scope.node(ResourceKind::Storage, "AssetBucket", "AWS::S3::Bucket", "assets");
    let name = node.physical_name.clone();
    let node = data_lifecycle(node, ctx)
        .attr("BucketName", name)
        .attr("Versioning", ctx.is_production())
        .attr("Encryption", "AES256")
        .attr("BlockPublicAccess", true);
    scope.add(node)?;
    scope.export("AssetBucketName", "Asset bucket name", "AssetBucket", "name", "assets-name")
}

fn state_table(scope: &mut SlotScope<'_>, variant: SlotVariant) -> IacResult<()> {
    let ctx = scope.context();
    let node = scope.node(ResourceKind::Storage, "StateTable", "AWS::DynamoDB::Table", "state");
    let name = node.physical_name.clone();
    let mut node = data_lifecycle(node, ctx)
        .attr("TableName", name)
        .attr(
            "KeySchema",
            AttributeValue::list([AttributeValue::map([
                ("AttributeName", "pk"),
                ("KeyType", "HASH"),
            ])]),
        )
        .attr("PointInTimeRecovery", ctx.is_production());

    match variant {
        SlotVariant::Provisioned { read, write } => {
            node.set("BillingMode", "PROVISIONED");
            node.set(
                "ProvisionedThroughput",
                AttributeValue::map([("ReadCapacityUnits", read), ("WriteCapacityUnits", write)]),
            );
        }
        _ => node.set("BillingMode", "PAY_PER_REQUEST"),
    }
    scope.add(node)
}

fn database(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let ctx = scope.context();
    let Some(settings) = ctx.features.database.clone() else {
        return Ok(());
    };

    let mut group = scope.node(ResourceKind::Database, "DatabaseSubnetGroup", "AWS::RDS::DBSubnetGroup", "db-subnets");
    let a = scope.reference(&mut group, "PrivateSubnetA", "id")?;
    let b = scope.reference(&mut group, "PrivateSubnetB", "id")?;
    let name = group.physical_name.clone();
    group = group
        .attr("DBSubnetGroupName", name)
        .attr("DBSubnetGroupDescription", "Private subnetworks for the database")
        .attr("SubnetIds", AttributeValue::list([a, b]));
    scope.add(group)?;

    let db = scope.node(ResourceKind::Database, "Database", "AWS::RDS::DBInstance", "db");
    let mut db = data_lifecycle(db, ctx);
    let subnet_group = scope.reference(&mut db, "DatabaseSubnetGroup", "id")?;
    let sg = scope.reference(&mut db, "DataSecurityGroup", "id")?;
    let name = db.physical_name.clone();
    db = db
        .attr("DBInstanceIdentifier", name)
        .attr("DBInstanceClass", settings.instance_class)
        .attr("Engine", "postgres")
        .attr("AllocatedStorage", settings.storage_gb)
        .attr("MultiAZ", settings.multi_az)
        .attr("DeletionProtection", ctx.is_production())
        .attr("ManageMasterUserPassword", true)
        .attr("DBSubnetGroupName", subnet_group)
        .attr("VpcSecurityGroupIds", AttributeValue::list([sg]));
    scope.add(db)
}

fn identity(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let mut role = scope.node(ResourceKind::Identity, "AppRole", "AWS::IAM::Role", "app-role");
    let bucket = scope.reference(&mut role, "AssetBucket", "arn")?;
    let table = scope.reference(&mut role, "StateTable", "arn")?;
    let name = role.physical_name.clone();
    role = role
        .attr("RoleName", name)
        .attr(
            "AssumeRolePolicy",
            AttributeValue::map([
                ("Effect", "Allow"),
                ("Principal", "ec2.amazonaws.com"),
                ("Action", "sts:AssumeRole"),
            ]),
        )
        .attr(
            "Policies",
            AttributeValue::list([
                AttributeValue::map([
                    ("Effect", AttributeValue::from("Allow")),
                    ("Action", AttributeValue::list(["s3:GetObject", "s3:PutObject"])),
                    ("Resource", AttributeValue::from(bucket)),
                ]),
                AttributeValue::map([
                    ("Effect", AttributeValue::from("Allow")),
                    ("Action", AttributeValue::list(["dynamodb:GetItem", "dynamodb:PutItem"])),
                    ("Resource", AttributeValue::from(table)),
                ]),
            ]),
        );
    scope.add(role)
}

fn compute_fleet(scope: &mut SlotScope<'_>, variant: SlotVariant) -> IacResult<()> {
    let instance_class = scope.context().features.instance_class.clone();
    let mut fleet = scope.node(ResourceKind::Compute, "AppFleet", "AWS::AutoScaling::AutoScalingGroup", "app-fleet");
    let a = scope.reference(&mut fleet, "PrivateSubnetA", "id")?;
    let b = scope.reference(&mut fleet, "PrivateSubnetB", "id")?;
    let sg = scope.reference(&mut fleet, "WebSecurityGroup", "id")?;
    let role = scope.reference(&mut fleet, "AppRole", "arn")?;
    let name = fleet.physical_name.clone();
    fleet = fleet
        .attr("AutoScalingGroupName", name)
        .attr("InstanceType", instance_class)
        .attr("VPCZoneIdentifier", AttributeValue::list([a, b]))
        .attr("SecurityGroupIds", AttributeValue::list([sg]))
        .attr("InstanceRole", role);

    match variant {
        SlotVariant::Autoscaling { min, max } => {
            fleet.set("MinSize", min);
            fleet.set("MaxSize", max);
            fleet.set(
                "ScalingPolicy",
                AttributeValue::map([
                    ("PolicyType", AttributeValue::from("TargetTrackingScaling")),
                    ("TargetCpuUtilization", AttributeValue::from(60i64)),
                ]),
            );
        }
        SlotVariant::Fixed { desired } => {
            fleet.set("MinSize", desired);
            fleet.set("MaxSize", desired);
            fleet.set("DesiredCapacity", desired);
        }
        _ => {
            fleet.set("MinSize", 1u32);
            fleet.set("MaxSize", 1u32);
        }
    }
    scope.add(fleet)?;
    scope.export("AppFleetName", "Compute fleet name", "AppFleet", "name", "app-fleet-name")
}

fn log_group(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let ctx = scope.context();
    let node = scope.node(ResourceKind::Observability, "AppLogGroup", "AWS::Logs::LogGroup", "app-logs");
    let name = node.physical_name.clone();
    let node = node
        .ephemeral(!ctx.is_production())
        .attr("LogGroupName", name)
        .attr("RetentionInDays", ctx.features.log_retention_days);
    scope.add(node)
}

fn alarms(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let mut alarm = scope
        .node(ResourceKind::Observability, "CpuAlarm", "AWS::CloudWatch::Alarm", "cpu-alarm")
        .production_only();
    let fleet = scope.reference(&mut alarm, "AppFleet", "name")?;
    scope.depend_on(&mut alarm, "AppLogGroup")?;
    let name = alarm.physical_name.clone();
    alarm = alarm
        .attr("AlarmName", name)
        .attr("MetricName", "CPUUtilization")
        .attr("Statistic", "Average")
        .attr("Threshold", 80i64)
        .attr("EvaluationPeriods", 3i64)
        .attr("ComparisonOperator", "GreaterThanThreshold")
        .attr("Dimensions", AttributeValue::map([("AutoScalingGroupName", fleet)]));
    scope.add(alarm)
}

fn api_key(scope: &mut SlotScope<'_>, _: SlotVariant) -> IacResult<()> {
    let node = scope
        .node(ResourceKind::Identity, "ApiKey", "AWS::ApiGateway::ApiKey", "api-key")
        .production_only();
    let name = node.physical_name.clone();
    let node = node.attr("Name", name).attr("Enabled", true);
    scope.add(node)?;
    scope.export("ApiKeyId", "Public API key identifier", "ApiKey", "id", "api-key-id")
}
